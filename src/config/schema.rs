//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::resilience::CircuitBreakerConfig;
use crate::security::rate_limit::RateLimitPolicy;

/// Root configuration for the dashboard API.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Shared counter store connections.
    pub store: StoreConfig,

    /// Circuit breakers, one per backing store.
    pub breakers: BreakersConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Cache-aside configuration.
    pub cache: CacheConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Demo dataset loading.
    pub seed: SeedConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time to produce a response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Which implementation backs the shared counter stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Redis-compatible server shared by all replicas.
    Redis,
    /// In-process map; only correct for a single replica.
    Memory,
}

/// Shared counter store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Store used by the cache-aside layer.
    pub cache_url: String,

    /// Store used by the rate limiter.
    pub ratelimit_url: String,

    /// Deadline for every store operation, in milliseconds.
    pub op_timeout_ms: u64,
}

impl StoreConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            cache_url: "redis://127.0.0.1:6379/0".to_string(),
            ratelimit_url: "redis://127.0.0.1:6379/1".to_string(),
            op_timeout_ms: 250,
        }
    }
}

/// Breakers for the two backing stores.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakersConfig {
    pub relational: BreakerConfig,
    pub document: BreakerConfig,
}

impl Default for BreakersConfig {
    fn default() -> Self {
        Self {
            relational: BreakerConfig::named("postgres_breaker"),
            document: BreakerConfig::named("mongo_breaker"),
        }
    }
}

/// A single circuit breaker.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BreakerConfig {
    /// Label used in logs and the `circuit_open_total` metric.
    pub name: String,

    /// Consecutive failures before the circuit opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before a probe is allowed.
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,

    /// Deadline for each guarded call in milliseconds (0 disables it).
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_secs() -> u64 {
    30
}

fn default_call_timeout_ms() -> u64 {
    5_000
}

impl BreakerConfig {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout_secs(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }

    pub fn to_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            reset_timeout: Duration::from_secs(self.reset_timeout_secs),
            call_timeout: (self.call_timeout_ms > 0)
                .then(|| Duration::from_millis(self.call_timeout_ms)),
        }
    }
}

/// What to do when the shared counter store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Proceed without the store's guarantee (admit / recompute).
    Open,
    /// Reject the operation.
    Closed,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Behavior when the rate-limit store is unreachable.
    pub failure_policy: FailurePolicy,

    /// Bucket capacity for routes without an override.
    pub capacity: f64,

    /// Tokens added per second for routes without an override.
    pub refill_per_sec: f64,

    /// Per-route overrides; the longest matching prefix wins.
    pub routes: Vec<RouteLimitConfig>,

    /// Minimum TTL of a bucket entry, in seconds.
    pub bucket_ttl_floor_secs: u64,

    /// TTL of buckets that never refill (refill rate 0), in seconds.
    pub bucket_idle_ttl_secs: u64,
}

impl RateLimitConfig {
    /// Policy for a request path.
    pub fn policy_for(&self, path: &str) -> RateLimitPolicy {
        self.routes
            .iter()
            .filter(|r| path.starts_with(&r.path_prefix))
            .max_by_key(|r| r.path_prefix.len())
            .map(|r| RateLimitPolicy::new(r.capacity, r.refill_per_sec))
            .unwrap_or_else(|| RateLimitPolicy::new(self.capacity, self.refill_per_sec))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_policy: FailurePolicy::Closed,
            capacity: 10.0,
            refill_per_sec: 1.0,
            routes: Vec::new(),
            bucket_ttl_floor_secs: 60,
            bucket_idle_ttl_secs: 3_600,
        }
    }
}

/// Rate limit override for a path prefix.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteLimitConfig {
    pub path_prefix: String,
    pub capacity: f64,
    pub refill_per_sec: f64,
}

/// Cache-aside configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Behavior when the cache store is unreachable.
    pub failure_policy: FailurePolicy,

    /// TTL of cached yield-trend aggregates, in seconds.
    pub trend_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Open,
            trend_ttl_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pretty output for development, JSON for production.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Demo dataset configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SeedConfig {
    /// Load a generated dataset into the backing stores at startup.
    pub on_startup: bool,

    /// Fixed RNG seed for reproducible datasets; random when unset.
    pub rng_seed: Option<u64>,
}
