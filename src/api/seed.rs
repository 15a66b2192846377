//! `POST /seed[?rng_seed=N]`: replace both backing stores with a generated
//! demo dataset.
//!
//! Writes go through the guarded stores, so an open breaker rejects the seed
//! like any other write. The trend namespace is invalidated afterwards.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;

use super::invalidate_trends;
use crate::http::{ApiError, AppState};
use crate::records::{generate_dataset, load_dataset, SeedReport};

#[derive(Debug, Default, Deserialize)]
pub struct SeedQuery {
    /// Fixed RNG seed for a reproducible dataset.
    pub rng_seed: Option<u64>,
}

pub async fn seed(
    State(state): State<AppState>,
    query: Result<Query<SeedQuery>, QueryRejection>,
) -> Result<Json<SeedReport>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(Json(seed_stores(&state, query.rng_seed).await?))
}

/// Generate a dataset ending today, load it and invalidate cached trends.
pub async fn seed_stores(state: &AppState, rng_seed: Option<u64>) -> Result<SeedReport, ApiError> {
    let mut rng = match rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let dataset = generate_dataset(&mut rng, Utc::now().date_naive());

    let report = load_dataset(state.relational.as_ref(), state.documents.as_ref(), dataset).await?;
    invalidate_trends(state).await?;

    tracing::info!(
        lots = report.lot_count,
        yields = report.yield_count,
        summaries = report.defect_summary_count,
        details = report.defect_detail_count,
        "Backing stores seeded"
    );
    Ok(report)
}
