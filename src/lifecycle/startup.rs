//! Startup orchestration.
//!
//! # Responsibilities
//! - Connect the shared counter stores (cache, rate limiting)
//! - Build one breaker per backing store and wrap the stores with them
//! - Assemble the limiter, cache-aside layer and handler state
//!
//! # Design Decisions
//! - Fail fast: an unreachable counter store at startup is fatal
//! - Subsystems initialize in order, not concurrently
//! - Breakers are constructed here and injected, never global

use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheAside;
use crate::config::{AppConfig, StoreBackend, StoreConfig};
use crate::http::AppState;
use crate::records::{
    DocumentStore, GuardedDocumentStore, GuardedRelationalStore, InMemoryDocumentStore,
    InMemoryRelationalStore, RelationalStore,
};
use crate::resilience::StoreBreakers;
use crate::security::TokenBucketLimiter;
use crate::store::{InMemoryCounterStore, RedisCounterStore, SharedCounterStore, StoreError};

/// The two shared counter stores, kept on separate connections.
#[derive(Clone)]
pub struct CounterStores {
    pub cache: Arc<dyn SharedCounterStore>,
    pub ratelimit: Arc<dyn SharedCounterStore>,
}

impl CounterStores {
    /// Connect according to `store.backend`.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        match config.backend {
            StoreBackend::Redis => {
                let cache =
                    RedisCounterStore::connect("cache", &config.cache_url, config.op_timeout())
                        .await?;
                let ratelimit = RedisCounterStore::connect(
                    "ratelimit",
                    &config.ratelimit_url,
                    config.op_timeout(),
                )
                .await?;
                Ok(Self {
                    cache: Arc::new(cache),
                    ratelimit: Arc::new(ratelimit),
                })
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-process counter stores; limits and cache are per replica");
                Ok(Self::in_memory())
            }
        }
    }

    pub fn in_memory() -> Self {
        Self {
            cache: Arc::new(InMemoryCounterStore::new("cache")),
            ratelimit: Arc::new(InMemoryCounterStore::new("ratelimit")),
        }
    }
}

/// The relational and document backing stores, unguarded.
#[derive(Clone)]
pub struct BackingStores {
    pub relational: Arc<dyn RelationalStore>,
    pub documents: Arc<dyn DocumentStore>,
}

impl BackingStores {
    pub fn in_memory() -> Self {
        Self {
            relational: Arc::new(InMemoryRelationalStore::new()),
            documents: Arc::new(InMemoryDocumentStore::new()),
        }
    }
}

/// Wire every subsystem into the handler state.
pub fn build_state(config: &AppConfig, counters: CounterStores, backing: BackingStores) -> AppState {
    let breakers = StoreBreakers::from_config(&config.breakers);
    tracing::info!(
        relational = %breakers.relational.name(),
        document = %breakers.document.name(),
        failure_threshold = config.breakers.relational.failure_threshold,
        "Circuit breakers initialized"
    );

    let relational = Arc::new(GuardedRelationalStore::new(
        backing.relational,
        breakers.relational.clone(),
    ));
    let documents = Arc::new(GuardedDocumentStore::new(
        backing.documents,
        breakers.document.clone(),
    ));

    let cache = Arc::new(CacheAside::new(
        counters.cache.clone(),
        config.cache.failure_policy,
    ));
    let limiter = Arc::new(TokenBucketLimiter::new(
        counters.ratelimit.clone(),
        config.rate_limit.clone(),
    ));
    tracing::info!(
        enabled = config.rate_limit.enabled,
        capacity = config.rate_limit.capacity,
        refill_per_sec = config.rate_limit.refill_per_sec,
        failure_policy = ?config.rate_limit.failure_policy,
        "Rate limiter initialized"
    );

    AppState {
        relational,
        documents,
        breakers,
        cache,
        limiter,
        cache_store: counters.cache,
        ratelimit_store: counters.ratelimit,
        trend_ttl: Duration::from_secs(config.cache.trend_ttl_secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FailurePolicy;
    use crate::resilience::CircuitState;

    #[tokio::test]
    async fn test_memory_backend_connects_without_redis() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            ..StoreConfig::default()
        };
        let stores = CounterStores::connect(&config).await.unwrap();
        assert_eq!(stores.cache.name(), "cache");
        assert_eq!(stores.ratelimit.name(), "ratelimit");
    }

    #[tokio::test]
    async fn test_build_state_uses_configured_breakers() {
        let config = AppConfig::default();
        let state = build_state(&config, CounterStores::in_memory(), BackingStores::in_memory());

        assert_eq!(state.breakers.relational.name(), "postgres_breaker");
        assert_eq!(state.breakers.document.name(), "mongo_breaker");
        assert_eq!(state.relational.breaker().state(), CircuitState::Closed);
        assert_eq!(state.cache.failure_policy(), FailurePolicy::Open);
        assert_eq!(state.limiter.failure_policy(), FailurePolicy::Closed);
        assert_eq!(state.trend_ttl, Duration::from_secs(30));
    }
}
