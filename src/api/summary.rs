//! `GET /summary/list`: every defect summary row.

use axum::{extract::State, Json};

use crate::http::{ApiError, AppState};
use crate::records::{DefectSummary, RelationalStore};

pub async fn list_summaries(
    State(state): State<AppState>,
) -> Result<Json<Vec<DefectSummary>>, ApiError> {
    Ok(Json(state.relational.list_defect_summaries().await?))
}
