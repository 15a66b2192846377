//! Shared counter store subsystem.
//!
//! # Data Flow
//! ```text
//! security::rate_limit (bucket hashes)  ─┐
//!                                        ├─▶ SharedCounterStore ─▶ redis.rs  (Redis/Dragonfly)
//! cache::aside (serialized aggregates)  ─┘                      └▶ memory.rs (in-process)
//! ```
//!
//! # Design Decisions
//! - Only single-key atomic operations; no scripts, transactions or locks
//! - Every operation is bounded by a deadline (`op_timeout`)
//! - The store knows nothing about buckets or cache entries; callers own the encoding

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::resilience::timeouts::within;

pub use self::memory::InMemoryCounterStore;
pub use self::redis::RedisCounterStore;

/// Errors raised by a shared counter store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or rejected the command.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    /// The operation did not complete within its deadline.
    #[error("counter store operation `{op}` timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },
}

/// Result of a store health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreHealth {
    Healthy,
    Unhealthy,
}

impl StoreHealth {
    pub fn is_healthy(self) -> bool {
        self == StoreHealth::Healthy
    }
}

/// Key-value store shared by every replica of the service.
///
/// Used by the rate limiter for bucket state and by the cache-aside layer for
/// serialized results. Implementations must be safe to call concurrently.
#[async_trait]
pub trait SharedCounterStore: Send + Sync {
    /// Name used in logs and metrics (e.g. `cache`, `ratelimit`).
    fn name(&self) -> &str;

    /// Fetch a plain value.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store a plain value that expires after `ttl`.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError>;

    /// Read every field of a hash. Missing keys yield an empty map.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Write the given fields into a hash, leaving other fields untouched.
    async fn hash_set(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError>;

    /// Set the time-to-live of an existing key.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// List keys matching a glob pattern (`*` wildcards).
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Delete keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// Probe the store.
    async fn ping(&self) -> StoreHealth;
}

/// Run a store operation under a deadline.
pub(crate) async fn bounded<T, F>(op: &'static str, after: Duration, fut: F) -> Result<T, StoreError>
where
    F: std::future::Future<Output = Result<T, StoreError>>,
{
    match within(Some(after), fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout { op, after }),
    }
}

/// Seconds for a `Duration`, never less than one.
///
/// Redis rejects `EX 0`, and sub-second TTLs would round down to it.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
