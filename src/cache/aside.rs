//! Cache-aside layer over the shared counter store.
//!
//! # Responsibilities
//! - Serve repeated expensive reads from the shared store
//! - Populate the store on a miss with a bounded TTL
//! - Drop a whole namespace after writes to the underlying data
//!
//! # Design Decisions
//! - Values are JSON; an entry that fails to decode is a miss, not an error
//! - Concurrent misses on a cold key each compute; the last write wins
//! - Under `FailurePolicy::Open` store trouble degrades to "always recompute"

use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::key::{derive_key, namespace_pattern, CacheParams};
use crate::config::FailurePolicy;
use crate::observability::metrics;
use crate::store::{SharedCounterStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache store error: {0}")]
    Store(#[from] StoreError),
}

/// Cache-aside wrapper around expensive computations.
pub struct CacheAside {
    store: Arc<dyn SharedCounterStore>,
    failure_policy: FailurePolicy,
}

impl CacheAside {
    pub fn new(store: Arc<dyn SharedCounterStore>, failure_policy: FailurePolicy) -> Self {
        Self {
            store,
            failure_policy,
        }
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Return the cached value for `(namespace, params)`, or run `compute`,
    /// store its result for `ttl` and return it.
    ///
    /// On a hit `compute` is never invoked. Errors from `compute` are passed
    /// through untouched and nothing is cached.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        namespace: &str,
        params: &CacheParams,
        ttl: Duration,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = derive_key(namespace, params);

        match self.store.get(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => {
                    tracing::debug!(key = %key, "Cache hit");
                    metrics::record_cache_hit(namespace);
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                }
            },
            Ok(None) => {}
            Err(e) => self.degrade(namespace, "get", e)?,
        }

        tracing::debug!(key = %key, "Cache miss");
        metrics::record_cache_miss(namespace);
        let value = compute().await?;

        match serde_json::to_vec(&value) {
            Ok(bytes) => {
                if let Err(e) = self.store.set(&key, &bytes, ttl).await {
                    self.degrade(namespace, "set", e)?;
                }
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Result not cacheable, skipping store");
            }
        }

        Ok(value)
    }

    /// Delete every entry of `namespace`, returning how many were removed.
    pub async fn invalidate_namespace(&self, namespace: &str) -> Result<usize, CacheError> {
        match self.delete_namespace(namespace).await {
            Ok(deleted) => {
                tracing::debug!(namespace = %namespace, deleted, "Cache namespace invalidated");
                metrics::record_cache_invalidation(namespace, deleted as u64);
                Ok(deleted)
            }
            Err(e) => match self.failure_policy {
                FailurePolicy::Open => {
                    tracing::error!(
                        namespace = %namespace,
                        error = %e,
                        "Cache invalidation failed, entries expire by TTL"
                    );
                    Ok(0)
                }
                FailurePolicy::Closed => Err(CacheError::Store(e)),
            },
        }
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<usize, StoreError> {
        let keys = self.store.keys_matching(&namespace_pattern(namespace)).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        Ok(self.store.delete(&keys).await? as usize)
    }

    fn degrade(&self, namespace: &str, op: &str, error: StoreError) -> Result<(), CacheError> {
        match self.failure_policy {
            FailurePolicy::Open => {
                tracing::warn!(
                    store = %self.store.name(),
                    namespace = %namespace,
                    op = %op,
                    error = %error,
                    "Cache store unavailable, bypassing cache"
                );
                Ok(())
            }
            FailurePolicy::Closed => Err(CacheError::Store(error)),
        }
    }
}
