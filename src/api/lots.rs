//! Lot CRUD.
//!
//! Every successful write invalidates the `yield_trend` cache namespace
//! before responding, so the next trend read recomputes.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use super::invalidate_trends;
use crate::http::{ApiError, AppState};
use crate::records::{Lot, LotUpdate, RelationalStore};

pub async fn list_lots(State(state): State<AppState>) -> Result<Json<Vec<Lot>>, ApiError> {
    Ok(Json(state.relational.list_lots().await?))
}

pub async fn create_lot(
    State(state): State<AppState>,
    body: Result<Json<Lot>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(lot) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    validate_lot(&lot)?;

    let lot_id = lot.lot_id.clone();
    state.relational.insert_lot(lot).await?;
    invalidate_trends(&state).await?;

    tracing::info!(lot_id = %lot_id, "Lot created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "created", "lot_id": lot_id })),
    ))
}

pub async fn update_lot(
    State(state): State<AppState>,
    Path(lot_id): Path<String>,
    body: Result<Json<LotUpdate>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(update) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    validate_update(&update)?;

    state.relational.update_lot(&lot_id, &update).await?;
    invalidate_trends(&state).await?;

    tracing::info!(lot_id = %lot_id, "Lot updated");
    Ok(Json(json!({ "status": "updated", "lot_id": lot_id, "data": update })))
}

pub async fn delete_lot(
    State(state): State<AppState>,
    Path(lot_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.relational.delete_lot(&lot_id).await?;
    invalidate_trends(&state).await?;

    tracing::info!(lot_id = %lot_id, "Lot deleted");
    Ok(Json(json!({ "status": "deleted", "lot_id": lot_id })))
}

fn validate_update(update: &LotUpdate) -> Result<(), ApiError> {
    if update.is_empty() {
        return Err(ApiError::BadRequest("no fields to update".to_string()));
    }
    let negative = update.total.is_some_and(|t| t < 0) || update.good.is_some_and(|g| g < 0);
    let inverted = matches!((update.good, update.total), (Some(g), Some(t)) if g > t);
    if negative || inverted {
        return Err(ApiError::BadRequest("invalid counts in update".to_string()));
    }
    Ok(())
}

fn validate_lot(lot: &Lot) -> Result<(), ApiError> {
    if lot.lot_id.trim().is_empty() {
        return Err(ApiError::BadRequest("lot_id must not be empty".to_string()));
    }
    if lot.total < 0 || lot.good < 0 || lot.good > lot.total {
        return Err(ApiError::BadRequest(format!(
            "invalid counts for {}: good={} total={}",
            lot.lot_id, lot.good, lot.total
        )));
    }
    Ok(())
}
