//! Request handlers.
//!
//! # Data Flow
//! ```text
//! reads:  handler → cache-aside → (miss) guarded stores → cache store
//! writes: handler → guarded store → invalidate `yield_trend` → response
//! ```
//!
//! # Design Decisions
//! - Invalidation runs before the write's response is returned
//! - Query and body rejections are rendered as `bad_request` JSON errors

pub mod defects;
pub mod health;
pub mod lots;
pub mod options;
pub mod seed;
pub mod summary;
pub mod yield_trend;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::http::request::track_requests;
use crate::http::{ApiError, AppState};
use crate::records::TREND_NAMESPACE;
use crate::security::rate_limit_middleware;

/// All routes, rate limited and instrumented.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/yield/trend", get(yield_trend::yield_trend))
        .route("/yield/list", get(yield_trend::list_yields))
        .route("/lots", get(lots::list_lots).post(lots::create_lot))
        .route("/lots/{lot_id}", put(lots::update_lot).delete(lots::delete_lot))
        .route(
            "/defects/details",
            get(defects::defect_details).post(defects::add_detail),
        )
        .route("/summary/list", get(summary::list_summaries))
        .route("/filter/dates", get(options::dates))
        .route("/filter/machines", get(options::machines))
        .route("/filter/recipes", get(options::recipes))
        .route("/filter/lots", get(options::lots))
        .route("/seed", post(seed::seed))
        .layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn(track_requests))
        .with_state(state)
}

/// Drop every cached trend aggregate. Runs after a write to any entity the
/// aggregate reads, before the write's response is returned.
pub(crate) async fn invalidate_trends(state: &AppState) -> Result<usize, ApiError> {
    let deleted = state.cache.invalidate_namespace(TREND_NAMESPACE).await?;
    tracing::debug!(deleted, "Trend cache invalidated");
    Ok(deleted)
}
