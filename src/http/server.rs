//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (request ID, tracing, timeout, rate limiting)
//! - Serve on a bound listener until shutdown is signalled

use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::api;
use crate::cache::CacheAside;
use crate::http::request::{request_span, X_REQUEST_ID};
use crate::records::{GuardedDocumentStore, GuardedRelationalStore};
use crate::resilience::StoreBreakers;
use crate::security::TokenBucketLimiter;
use crate::store::SharedCounterStore;

/// Application state injected into handlers.
///
/// Backing stores are only reachable through their breaker-guarded wrappers.
#[derive(Clone)]
pub struct AppState {
    pub relational: Arc<GuardedRelationalStore>,
    pub documents: Arc<GuardedDocumentStore>,
    pub breakers: StoreBreakers,
    pub cache: Arc<CacheAside>,
    pub limiter: Arc<TokenBucketLimiter>,
    pub cache_store: Arc<dyn SharedCounterStore>,
    pub ratelimit_store: Arc<dyn SharedCounterStore>,
    /// TTL of cached yield-trend aggregates.
    pub trend_ttl: Duration,
}

/// HTTP server for the dashboard API.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState, request_timeout: Duration) -> Self {
        Self {
            router: Self::build_router(state, request_timeout),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, request_timeout: Duration) -> Router {
        api::routes(state).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(request_span))
                .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                .layer(TimeoutLayer::new(request_timeout)),
        )
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until a shutdown signal is broadcast.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Draining in-flight requests");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
