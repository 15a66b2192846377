//! Production records subsystem.
//!
//! # Data Flow
//! ```text
//! api handlers
//!     → guarded.rs (breaker + call timeout per backing store)
//!     → RelationalStore  (lots, yield records, defect summaries)
//!     → DocumentStore    (per-defect details)
//!
//! trend.rs    assembles the yield-trend aggregate from both stores
//! options.rs  cascading filter choices (dates → stations → products → lots)
//! seed.rs     generated demo dataset, written through the guarded stores
//! ```
//!
//! # Design Decisions
//! - Backing stores are traits; handlers only ever see the guarded wrappers
//! - Domain outcomes (not found, conflict) are not store failures and never
//!   trip a breaker
//! - `memory.rs` provides in-process stores for development and tests

pub mod guarded;
pub mod memory;
pub mod options;
pub mod seed;
pub mod trend;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use guarded::{GuardedDocumentStore, GuardedRelationalStore};
pub use memory::{InMemoryDocumentStore, InMemoryRelationalStore};
pub use seed::{generate_dataset, load_dataset, SeedDataset, SeedReport};
pub use trend::{compute_trend, DefectCount, TrendQuery, TrendReport, TREND_NAMESPACE};

/// A production lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub lot_id: String,
    /// Recipe.
    pub product: String,
    /// Machine the lot ran on.
    pub station: String,
    pub total: i64,
    pub good: i64,
}

/// Partial update of a lot; only the fields present are changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub good: Option<i64>,
}

impl LotUpdate {
    pub fn is_empty(&self) -> bool {
        self.product.is_none() && self.station.is_none() && self.total.is_none() && self.good.is_none()
    }

    pub fn apply_to(&self, lot: &mut Lot) {
        if let Some(product) = &self.product {
            lot.product = product.clone();
        }
        if let Some(station) = &self.station {
            lot.station = station.clone();
        }
        if let Some(total) = self.total {
            lot.total = total;
        }
        if let Some(good) = self.good {
            lot.good = good;
        }
    }
}

/// One measured yield of a lot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldRecord {
    pub lot_id: String,
    pub good: i64,
    pub total: i64,
    pub yield_rate: f64,
    pub timestamp: DateTime<Utc>,
}

/// A yield record joined with its lot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldRow {
    pub lot_id: String,
    pub station: String,
    pub product: String,
    pub yield_rate: f64,
    pub timestamp: DateTime<Utc>,
}

/// Defect count of one type within one lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefectSummary {
    pub lot_id: String,
    pub defect_type: String,
    pub count: i64,
}

/// A single located defect, as stored in the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefectDetail {
    pub lot_id: String,
    pub defect_type: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub severity: Option<String>,
    pub wafer: Option<i64>,
}

/// A defect detail together with the id the document store assigned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDetail {
    pub id: String,
    #[serde(flatten)]
    pub detail: DefectDetail,
}

/// Full contents of the relational store, used to replace it wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationalDataset {
    pub lots: Vec<Lot>,
    pub yields: Vec<YieldRecord>,
    pub summaries: Vec<DefectSummary>,
}

/// Selection of yield rows. Dates are inclusive and compared on the UTC date
/// of each record; empty `lots` means every lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YieldFilter {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub station: Option<String>,
    pub product: Option<String>,
    pub lots: Vec<String>,
}

impl YieldFilter {
    pub fn matches(&self, lot: &Lot, record: &YieldRecord) -> bool {
        let day = record.timestamp.date_naive();
        day >= self.date_from
            && day <= self.date_to
            && self.station.as_ref().map_or(true, |s| *s == lot.station)
            && self.product.as_ref().map_or(true, |p| *p == lot.product)
            && (self.lots.is_empty() || self.lots.contains(&lot.lot_id))
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RecordError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// The backing store failed. Counted by its breaker.
    #[error("{store} unavailable: {reason}")]
    Unavailable { store: String, reason: String },

    #[error("circuit breaker `{name}` is open")]
    BreakerOpen { name: String },

    #[error("call guarded by `{name}` timed out after {after:?}")]
    Timeout { name: String, after: Duration },
}

impl RecordError {
    /// Whether this outcome says something about the health of the store.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, RecordError::Unavailable { .. })
    }
}

/// Relational backing store: lots, yield records and defect summaries.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn yield_rows(&self, filter: &YieldFilter) -> Result<Vec<YieldRow>, RecordError>;

    async fn defect_counts(&self, lot_ids: &[String]) -> Result<Vec<DefectSummary>, RecordError>;

    async fn list_lots(&self) -> Result<Vec<Lot>, RecordError>;

    /// Every yield record, newest first.
    async fn list_yields(&self) -> Result<Vec<YieldRecord>, RecordError>;

    async fn list_defect_summaries(&self) -> Result<Vec<DefectSummary>, RecordError>;

    /// Fails with `Conflict` when the lot already exists.
    async fn insert_lot(&self, lot: Lot) -> Result<(), RecordError>;

    /// Fails with `NotFound` when the lot does not exist.
    async fn update_lot(&self, lot_id: &str, update: &LotUpdate) -> Result<Lot, RecordError>;

    /// Fails with `NotFound` when the lot does not exist and with `Conflict`
    /// while yield records still reference it.
    async fn delete_lot(&self, lot_id: &str) -> Result<(), RecordError>;

    /// Drop every lot, yield record and defect summary and load `dataset`.
    async fn replace_all(&self, dataset: RelationalDataset) -> Result<(), RecordError>;
}

/// Document backing store: per-defect details.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn defect_details(&self, lot_ids: &[String]) -> Result<Vec<DefectDetail>, RecordError>;

    /// Store one detail and return it with its assigned id.
    async fn insert_detail(&self, detail: DefectDetail) -> Result<StoredDetail, RecordError>;

    /// Drop every detail and load `details`. Returns how many were loaded.
    async fn replace_details(&self, details: Vec<DefectDetail>) -> Result<usize, RecordError>;
}
