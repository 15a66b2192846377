//! Breaker-guarded backing stores.
//!
//! Each wrapper implements the same trait as the store it wraps and routes
//! every method through that store's circuit breaker, so callers cannot reach
//! a backing store unguarded.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

use super::{
    DefectDetail, DefectSummary, DocumentStore, Lot, LotUpdate, RecordError, RelationalDataset,
    RelationalStore, StoredDetail, YieldFilter, YieldRecord, YieldRow,
};
use crate::resilience::{guard, BreakerError, CircuitBreaker};

/// Run `operation` under `breaker`.
///
/// Only store failures count against the breaker; domain outcomes such as
/// `NotFound` pass through as successful calls.
async fn guarded_call<T, F, Fut>(breaker: &CircuitBreaker, operation: F) -> Result<T, RecordError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, RecordError>>,
{
    let outcome = breaker
        .call(move || async move {
            match operation().await {
                Err(e) if e.is_store_failure() => Err(e),
                other => Ok(other),
            }
        })
        .await;

    match outcome {
        Ok(result) => result,
        Err(e) => Err(from_breaker(e)),
    }
}

fn from_breaker(error: BreakerError<RecordError>) -> RecordError {
    match error {
        BreakerError::Open { name } => RecordError::BreakerOpen { name },
        BreakerError::Timeout { name, after } => RecordError::Timeout { name, after },
        BreakerError::Failed(e) => e,
    }
}

/// Relational store behind a circuit breaker.
pub struct GuardedRelationalStore {
    inner: Arc<dyn RelationalStore>,
    breaker: Arc<CircuitBreaker>,
}

impl GuardedRelationalStore {
    pub fn new(inner: Arc<dyn RelationalStore>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

#[async_trait]
impl RelationalStore for GuardedRelationalStore {
    async fn yield_rows(&self, filter: &YieldFilter) -> Result<Vec<YieldRow>, RecordError> {
        guarded_call(&self.breaker, || self.inner.yield_rows(filter)).await
    }

    async fn defect_counts(&self, lot_ids: &[String]) -> Result<Vec<DefectSummary>, RecordError> {
        guarded_call(&self.breaker, || self.inner.defect_counts(lot_ids)).await
    }

    async fn list_lots(&self) -> Result<Vec<Lot>, RecordError> {
        guarded_call(&self.breaker, || self.inner.list_lots()).await
    }

    async fn list_yields(&self) -> Result<Vec<YieldRecord>, RecordError> {
        guarded_call(&self.breaker, || self.inner.list_yields()).await
    }

    async fn list_defect_summaries(&self) -> Result<Vec<DefectSummary>, RecordError> {
        guarded_call(&self.breaker, || self.inner.list_defect_summaries()).await
    }

    async fn insert_lot(&self, lot: Lot) -> Result<(), RecordError> {
        guarded_call(&self.breaker, move || self.inner.insert_lot(lot)).await
    }

    async fn update_lot(&self, lot_id: &str, update: &LotUpdate) -> Result<Lot, RecordError> {
        guarded_call(&self.breaker, || self.inner.update_lot(lot_id, update)).await
    }

    async fn delete_lot(&self, lot_id: &str) -> Result<(), RecordError> {
        guarded_call(&self.breaker, || self.inner.delete_lot(lot_id)).await
    }

    async fn replace_all(&self, dataset: RelationalDataset) -> Result<(), RecordError> {
        guarded_call(&self.breaker, move || self.inner.replace_all(dataset)).await
    }
}

type DetailsFn = Box<
    dyn Fn(Vec<String>) -> BoxFuture<'static, Result<Vec<DefectDetail>, BreakerError<RecordError>>>
        + Send
        + Sync,
>;

/// Document store behind a circuit breaker.
///
/// Detail lookups go through a `guard`-wrapped closure, so every error from
/// them counts as a failure. Writes use the same store-failure rule as the
/// relational wrapper.
pub struct GuardedDocumentStore {
    inner: Arc<dyn DocumentStore>,
    breaker: Arc<CircuitBreaker>,
    details: DetailsFn,
}

impl GuardedDocumentStore {
    pub fn new(inner: Arc<dyn DocumentStore>, breaker: Arc<CircuitBreaker>) -> Self {
        let lookup = inner.clone();
        let details = guard(breaker.clone(), move |lot_ids: Vec<String>| {
            let lookup = lookup.clone();
            async move { lookup.defect_details(&lot_ids).await }
        });
        Self {
            inner,
            breaker,
            details: Box::new(details),
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

#[async_trait]
impl DocumentStore for GuardedDocumentStore {
    async fn defect_details(&self, lot_ids: &[String]) -> Result<Vec<DefectDetail>, RecordError> {
        (self.details)(lot_ids.to_vec()).await.map_err(from_breaker)
    }

    async fn insert_detail(&self, detail: DefectDetail) -> Result<StoredDetail, RecordError> {
        guarded_call(&self.breaker, move || self.inner.insert_detail(detail)).await
    }

    async fn replace_details(&self, details: Vec<DefectDetail>) -> Result<usize, RecordError> {
        guarded_call(&self.breaker, move || self.inner.replace_details(details)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{InMemoryDocumentStore, InMemoryRelationalStore};
    use crate::resilience::{CircuitBreakerConfig, CircuitState};
    use std::time::Duration;

    fn breaker(name: &str, call_timeout: Option<Duration>) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            name,
            CircuitBreakerConfig {
                failure_threshold: 5,
                reset_timeout: Duration::from_secs(30),
                call_timeout,
            },
        ))
    }

    #[tokio::test]
    async fn test_store_failures_open_breaker() {
        let store = InMemoryRelationalStore::new();
        store.set_available(false);
        let guarded =
            GuardedRelationalStore::new(Arc::new(store.clone()), breaker("postgres_breaker", None));

        for _ in 0..5 {
            let err = guarded.list_lots().await.unwrap_err();
            assert!(matches!(err, RecordError::Unavailable { .. }));
        }
        assert_eq!(guarded.breaker().state(), CircuitState::Open);

        // Rejected without touching the store.
        let err = guarded.list_lots().await.unwrap_err();
        assert!(matches!(err, RecordError::BreakerOpen { ref name } if name == "postgres_breaker"));
        assert_eq!(store.call_count(), 5);
    }

    #[tokio::test]
    async fn test_domain_errors_do_not_trip_breaker() {
        let store = InMemoryRelationalStore::new();
        let guarded =
            GuardedRelationalStore::new(Arc::new(store.clone()), breaker("postgres_breaker", None));

        for _ in 0..10 {
            let err = guarded.delete_lot("missing").await.unwrap_err();
            assert!(matches!(err, RecordError::NotFound(_)));
        }
        assert_eq!(guarded.breaker().state(), CircuitState::Closed);
        assert_eq!(guarded.breaker().failure_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let store = InMemoryRelationalStore::new();
        store.set_latency(Duration::from_millis(200));
        let guarded = GuardedRelationalStore::new(
            Arc::new(store),
            breaker("postgres_breaker", Some(Duration::from_millis(20))),
        );

        let err = guarded.list_lots().await.unwrap_err();
        assert!(matches!(err, RecordError::Timeout { .. }));
        assert_eq!(guarded.breaker().failure_count(), 1);
    }

    #[tokio::test]
    async fn test_document_store_is_guarded() {
        let store = InMemoryDocumentStore::new();
        let guarded =
            GuardedDocumentStore::new(Arc::new(store.clone()), breaker("mongo_breaker", None));
        let lots = vec!["L1".to_string()];

        assert!(guarded.defect_details(&lots).await.unwrap().is_empty());

        store.set_available(false);
        for _ in 0..5 {
            assert!(guarded.defect_details(&lots).await.is_err());
        }
        let err = guarded.defect_details(&lots).await.unwrap_err();
        assert!(matches!(err, RecordError::BreakerOpen { .. }));
        assert_eq!(store.call_count(), 6);
    }

    #[tokio::test]
    async fn test_detail_writes_share_document_breaker() {
        let store = InMemoryDocumentStore::new();
        let guarded =
            GuardedDocumentStore::new(Arc::new(store.clone()), breaker("mongo_breaker", None));
        let detail = DefectDetail {
            lot_id: "L1".to_string(),
            defect_type: "particle".to_string(),
            x: Some(3.0),
            y: Some(4.0),
            severity: Some("H".to_string()),
            wafer: Some(7),
        };

        let stored = guarded.insert_detail(detail.clone()).await.unwrap();
        assert_eq!(stored.detail, detail);
        assert_eq!(store.len(), 1);

        store.set_available(false);
        for _ in 0..5 {
            let err = guarded.insert_detail(detail.clone()).await.unwrap_err();
            assert!(err.is_store_failure());
        }
        assert_eq!(guarded.breaker().state(), CircuitState::Open);

        // Reads are rejected by the breaker the writes opened.
        let err = guarded.defect_details(&["L1".to_string()]).await.unwrap_err();
        assert!(matches!(err, RecordError::BreakerOpen { .. }));
        let err = guarded.replace_details(Vec::new()).await.unwrap_err();
        assert!(matches!(err, RecordError::BreakerOpen { .. }));
    }
}
