//! Cascading filter choices: `/filter/dates`, `/filter/machines`,
//! `/filter/recipes` and `/filter/lots`. Uncached; each is one call through
//! the relational breaker.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::http::{ApiError, AppState};
use crate::records::options;

#[derive(Debug, Deserialize)]
pub struct MachinesQuery {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct RecipesQuery {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub station: String,
}

#[derive(Debug, Deserialize)]
pub struct LotsQuery {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub station: String,
    pub product: String,
}

pub async fn dates(State(state): State<AppState>) -> Result<Json<Vec<NaiveDate>>, ApiError> {
    Ok(Json(options::available_dates(state.relational.as_ref()).await?))
}

pub async fn machines(
    State(state): State<AppState>,
    query: Result<Query<MachinesQuery>, QueryRejection>,
) -> Result<Json<Vec<String>>, ApiError> {
    let Query(q) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    check_range(q.date_from, q.date_to)?;
    Ok(Json(
        options::stations(state.relational.as_ref(), q.date_from, q.date_to).await?,
    ))
}

pub async fn recipes(
    State(state): State<AppState>,
    query: Result<Query<RecipesQuery>, QueryRejection>,
) -> Result<Json<Vec<String>>, ApiError> {
    let Query(q) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    check_range(q.date_from, q.date_to)?;
    let products =
        options::products(state.relational.as_ref(), q.date_from, q.date_to, &q.station).await?;
    Ok(Json(products))
}

pub async fn lots(
    State(state): State<AppState>,
    query: Result<Query<LotsQuery>, QueryRejection>,
) -> Result<Json<Vec<String>>, ApiError> {
    let Query(q) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    check_range(q.date_from, q.date_to)?;
    let lot_ids = options::lot_ids(
        state.relational.as_ref(),
        q.date_from,
        q.date_to,
        &q.station,
        &q.product,
    )
    .await?;
    Ok(Json(lot_ids))
}

fn check_range(date_from: NaiveDate, date_to: NaiveDate) -> Result<(), ApiError> {
    if date_from > date_to {
        return Err(ApiError::BadRequest(format!(
            "date_from {} is after date_to {}",
            date_from, date_to
        )));
    }
    Ok(())
}
