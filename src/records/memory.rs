//! In-process backing stores.
//!
//! Stand-ins for the relational and document databases. Both can be switched
//! offline to simulate an outage, and count how often they are called so
//! tests can assert that cached reads never reach them.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{
    DefectDetail, DefectSummary, DocumentStore, Lot, LotUpdate, RecordError, RelationalDataset,
    RelationalStore, StoredDetail, YieldFilter, YieldRecord, YieldRow,
};

/// Outage switch, artificial latency and call counter shared by both stores.
#[derive(Debug, Default)]
struct Health {
    offline: AtomicBool,
    latency_ms: AtomicUsize,
    calls: AtomicUsize,
}

impl Health {
    async fn enter(&self, store: &str) -> Result<(), RecordError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency as u64)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(RecordError::Unavailable {
                store: store.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Tables {
    lots: BTreeMap<String, Lot>,
    yields: Vec<YieldRecord>,
    defects: Vec<DefectSummary>,
}

/// In-process relational store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRelationalStore {
    tables: Arc<RwLock<Tables>>,
    health: Arc<Health>,
}

impl InMemoryRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a yield record. The referenced lot is expected to exist.
    pub fn add_yield(&self, record: YieldRecord) {
        self.tables.write().yields.push(record);
    }

    pub fn add_defect_summary(&self, summary: DefectSummary) {
        self.tables.write().defects.push(summary);
    }

    /// Seed a lot directly, bypassing conflict checks.
    pub fn add_lot(&self, lot: Lot) {
        self.tables.write().lots.insert(lot.lot_id.clone(), lot);
    }

    pub fn set_available(&self, available: bool) {
        self.health.offline.store(!available, Ordering::SeqCst);
    }

    /// Delay every call, to exercise call timeouts.
    pub fn set_latency(&self, latency: Duration) {
        self.health
            .latency_ms
            .store(latency.as_millis() as usize, Ordering::SeqCst);
    }

    /// Number of calls made against this store, including failed ones.
    pub fn call_count(&self) -> usize {
        self.health.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelationalStore for InMemoryRelationalStore {
    async fn yield_rows(&self, filter: &YieldFilter) -> Result<Vec<YieldRow>, RecordError> {
        self.health.enter("relational").await?;
        let tables = self.tables.read();
        let rows = tables
            .yields
            .iter()
            .filter_map(|record| {
                let lot = tables.lots.get(&record.lot_id)?;
                filter.matches(lot, record).then(|| YieldRow {
                    lot_id: lot.lot_id.clone(),
                    station: lot.station.clone(),
                    product: lot.product.clone(),
                    yield_rate: record.yield_rate,
                    timestamp: record.timestamp,
                })
            })
            .collect();
        Ok(rows)
    }

    async fn defect_counts(&self, lot_ids: &[String]) -> Result<Vec<DefectSummary>, RecordError> {
        self.health.enter("relational").await?;
        let tables = self.tables.read();
        Ok(tables
            .defects
            .iter()
            .filter(|d| lot_ids.contains(&d.lot_id))
            .cloned()
            .collect())
    }

    async fn list_lots(&self) -> Result<Vec<Lot>, RecordError> {
        self.health.enter("relational").await?;
        Ok(self.tables.read().lots.values().cloned().collect())
    }

    async fn list_yields(&self) -> Result<Vec<YieldRecord>, RecordError> {
        self.health.enter("relational").await?;
        let mut yields = self.tables.read().yields.clone();
        yields.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(yields)
    }

    async fn list_defect_summaries(&self) -> Result<Vec<DefectSummary>, RecordError> {
        self.health.enter("relational").await?;
        Ok(self.tables.read().defects.clone())
    }

    async fn insert_lot(&self, lot: Lot) -> Result<(), RecordError> {
        self.health.enter("relational").await?;
        let mut tables = self.tables.write();
        if tables.lots.contains_key(&lot.lot_id) {
            return Err(RecordError::Conflict(format!(
                "Lot {} already exists",
                lot.lot_id
            )));
        }
        tables.lots.insert(lot.lot_id.clone(), lot);
        Ok(())
    }

    async fn update_lot(&self, lot_id: &str, update: &LotUpdate) -> Result<Lot, RecordError> {
        self.health.enter("relational").await?;
        let mut tables = self.tables.write();
        let lot = tables
            .lots
            .get_mut(lot_id)
            .ok_or_else(|| RecordError::NotFound(lot_id.to_string()))?;
        update.apply_to(lot);
        Ok(lot.clone())
    }

    async fn delete_lot(&self, lot_id: &str) -> Result<(), RecordError> {
        self.health.enter("relational").await?;
        let mut tables = self.tables.write();
        if !tables.lots.contains_key(lot_id) {
            return Err(RecordError::NotFound(lot_id.to_string()));
        }
        if tables.yields.iter().any(|y| y.lot_id == lot_id) {
            return Err(RecordError::Conflict(format!(
                "Cannot delete {}: it is referenced by yield records",
                lot_id
            )));
        }
        tables.lots.remove(lot_id);
        Ok(())
    }

    async fn replace_all(&self, dataset: RelationalDataset) -> Result<(), RecordError> {
        self.health.enter("relational").await?;
        let mut tables = self.tables.write();
        tables.lots = dataset
            .lots
            .into_iter()
            .map(|lot| (lot.lot_id.clone(), lot))
            .collect();
        tables.yields = dataset.yields;
        tables.defects = dataset.summaries;
        Ok(())
    }
}

/// In-process document store. Ids are assigned from a counter that is never
/// reset, so an id is not reused after the collection is replaced.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    details: Arc<RwLock<Vec<StoredDetail>>>,
    next_id: Arc<AtomicU64>,
    health: Arc<Health>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a detail directly, bypassing the outage switch.
    pub fn add_detail(&self, detail: DefectDetail) -> StoredDetail {
        let stored = self.stored(detail);
        self.details.write().push(stored.clone());
        stored
    }

    /// Number of stored details.
    pub fn len(&self) -> usize {
        self.details.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stored(&self, detail: DefectDetail) -> StoredDetail {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        StoredDetail {
            id: format!("{:024x}", id),
            detail,
        }
    }

    pub fn set_available(&self, available: bool) {
        self.health.offline.store(!available, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.health
            .latency_ms
            .store(latency.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.health.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn defect_details(&self, lot_ids: &[String]) -> Result<Vec<DefectDetail>, RecordError> {
        self.health.enter("document").await?;
        Ok(self
            .details
            .read()
            .iter()
            .filter(|d| lot_ids.contains(&d.detail.lot_id))
            .map(|d| d.detail.clone())
            .collect())
    }

    async fn insert_detail(&self, detail: DefectDetail) -> Result<StoredDetail, RecordError> {
        self.health.enter("document").await?;
        let stored = self.stored(detail);
        self.details.write().push(stored.clone());
        Ok(stored)
    }

    async fn replace_details(&self, details: Vec<DefectDetail>) -> Result<usize, RecordError> {
        self.health.enter("document").await?;
        let stored: Vec<StoredDetail> = details.into_iter().map(|d| self.stored(d)).collect();
        let count = stored.len();
        *self.details.write() = stored;
        Ok(count)
    }
}
