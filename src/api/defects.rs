//! Located defects in the document store.
//!
//! - `GET /defects/details?lots=L1,L2`: details of the listed lots
//! - `POST /defects/details`: store one detail; details feed the trend
//!   aggregate, so the `yield_trend` namespace is invalidated

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::invalidate_trends;
use crate::http::{ApiError, AppState};
use crate::records::{DefectDetail, DocumentStore, StoredDetail};

#[derive(Debug, Deserialize)]
pub struct DetailsQuery {
    /// Comma-separated lot ids.
    pub lots: String,
}

pub async fn defect_details(
    State(state): State<AppState>,
    query: Result<Query<DetailsQuery>, QueryRejection>,
) -> Result<Json<Vec<DefectDetail>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let lot_ids: Vec<String> = query
        .lots
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    if lot_ids.is_empty() {
        return Err(ApiError::BadRequest("lots must name at least one lot".to_string()));
    }

    Ok(Json(state.documents.defect_details(&lot_ids).await?))
}

pub async fn add_detail(
    State(state): State<AppState>,
    body: Result<Json<DefectDetail>, JsonRejection>,
) -> Result<(StatusCode, Json<StoredDetail>), ApiError> {
    let Json(detail) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if detail.lot_id.trim().is_empty() || detail.defect_type.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "lot_id and defect_type must not be empty".to_string(),
        ));
    }

    let stored = state.documents.insert_detail(detail).await?;
    invalidate_trends(&state).await?;

    tracing::info!(
        id = %stored.id,
        lot_id = %stored.detail.lot_id,
        defect_type = %stored.detail.defect_type,
        "Defect detail stored"
    );
    Ok((StatusCode::CREATED, Json(stored)))
}
