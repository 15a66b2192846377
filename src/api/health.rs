//! Service health.
//!
//! Reports each counter store's reachability and each breaker's state. The
//! service is unhealthy (503) while either counter store is unreachable; an
//! open breaker degrades individual endpoints but not the service as a whole.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::http::AppState;
use crate::resilience::{BreakerSnapshot, CircuitState};

#[derive(Debug, Serialize)]
pub struct StoreStatus {
    pub name: String,
    pub healthy: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// `ok`, `degraded` (a breaker is not closed) or `unavailable`.
    pub status: &'static str,
    pub stores: Vec<StoreStatus>,
    pub breakers: Vec<BreakerSnapshot>,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let (cache, ratelimit) = tokio::join!(state.cache_store.ping(), state.ratelimit_store.ping());
    let stores = vec![
        StoreStatus {
            name: state.cache_store.name().to_string(),
            healthy: cache.is_healthy(),
        },
        StoreStatus {
            name: state.ratelimit_store.name().to_string(),
            healthy: ratelimit.is_healthy(),
        },
    ];
    let breakers = state.breakers.snapshots();

    let stores_up = stores.iter().all(|s| s.healthy);
    let breakers_closed = breakers.iter().all(|b| b.state == CircuitState::Closed);
    let (status, code) = match (stores_up, breakers_closed) {
        (false, _) => ("unavailable", StatusCode::SERVICE_UNAVAILABLE),
        (true, false) => ("degraded", StatusCode::OK),
        (true, true) => ("ok", StatusCode::OK),
    };

    (
        code,
        Json(HealthReport {
            status,
            stores,
            breakers,
        }),
    )
}
