//! Yield endpoints.
//!
//! - `GET /yield/trend`: cached yield-trend aggregate
//! - `GET /yield/list`: every yield record, newest first

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};

use crate::http::{ApiError, AppState};
use crate::records::{
    compute_trend, RelationalStore, TrendQuery, TrendReport, YieldRecord, TREND_NAMESPACE,
};

pub async fn yield_trend(
    State(state): State<AppState>,
    query: Result<Query<TrendQuery>, QueryRejection>,
) -> Result<Json<TrendReport>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    query.validate().map_err(ApiError::BadRequest)?;

    let filter = query.to_filter();
    let report = state
        .cache
        .get_or_compute(
            TREND_NAMESPACE,
            &query.cache_params(),
            state.trend_ttl,
            || async {
                compute_trend(state.relational.as_ref(), state.documents.as_ref(), &filter)
                    .await
                    .map_err(ApiError::from)
            },
        )
        .await?;

    Ok(Json(report))
}

pub async fn list_yields(State(state): State<AppState>) -> Result<Json<Vec<YieldRecord>>, ApiError> {
    Ok(Json(state.relational.list_yields().await?))
}
