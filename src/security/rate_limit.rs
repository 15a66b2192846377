//! Token-bucket rate limiting backed by the shared counter store.
//!
//! # Responsibilities
//! - Admit or reject one unit of work per `(caller, resource)` bucket
//! - Keep bucket state in the shared store so every replica sees the same budget
//! - Apply the configured failure policy when the store is unreachable
//!
//! # Design Decisions
//! - Lazy refill computed from the stored timestamp; no background timer
//! - Buckets are hashes with `tokens` and `timestamp` (float seconds since epoch)
//! - Read-modify-write is not atomic: two replicas racing on one bucket can
//!   both admit from the same token. Over-admission is bounded by the number of
//!   concurrent requests per bucket
//! - A rejection writes nothing, so the stored pair keeps accruing refill

use axum::{
    body::Body,
    extract::{ConnectInfo, MatchedPath, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::{FailurePolicy, RateLimitConfig};
use crate::http::response::ApiError;
use crate::observability::metrics;
use crate::store::{SharedCounterStore, StoreError};

const TOKENS_FIELD: &str = "tokens";
const TIMESTAMP_FIELD: &str = "timestamp";

/// Bucket shape for one class of requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitPolicy {
    /// Maximum tokens a bucket can hold (the burst size).
    pub capacity: f64,
    /// Tokens added per second. Zero means the bucket never refills.
    pub refill_per_sec: f64,
}

impl RateLimitPolicy {
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_per_sec,
        }
    }

    /// Time until a bucket holding `tokens` has a whole token again.
    fn retry_after(&self, tokens: f64) -> Option<Duration> {
        if self.refill_per_sec <= 0.0 {
            return None;
        }
        let missing = (1.0 - tokens).max(0.0);
        Some(Duration::from_secs_f64(missing / self.refill_per_sec))
    }

    /// Long enough for a drained bucket to refill twice over, so an expired
    /// bucket is indistinguishable from a full one.
    fn bucket_ttl(&self, floor_secs: u64, idle_secs: u64) -> Duration {
        if self.refill_per_sec <= 0.0 {
            return Duration::from_secs(idle_secs);
        }
        let refill_secs = (2.0 * self.capacity / self.refill_per_sec).ceil() as u64;
        Duration::from_secs(refill_secs.max(floor_secs))
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// The request may proceed; `remaining` tokens are left in the bucket.
    Admitted { remaining: f64 },
    /// The bucket is empty. `retry_after` is `None` when it never refills.
    Rejected { retry_after: Option<Duration> },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

/// Distributed token-bucket limiter.
pub struct TokenBucketLimiter {
    store: Arc<dyn SharedCounterStore>,
    config: RateLimitConfig,
}

impl TokenBucketLimiter {
    pub fn new(store: Arc<dyn SharedCounterStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.config.failure_policy
    }

    /// Policy for a request path (longest configured prefix, else the default).
    pub fn policy_for(&self, path: &str) -> RateLimitPolicy {
        self.config.policy_for(path)
    }

    /// Try to take one token from `key`'s bucket.
    pub async fn admit(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
    ) -> Result<Admission, RateLimitError> {
        self.admit_at(key, policy, unix_now()).await
    }

    /// [`admit`](Self::admit) with an explicit clock, in seconds since the Unix epoch.
    pub async fn admit_at(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        now: f64,
    ) -> Result<Admission, RateLimitError> {
        match self.take_token(key, policy, now).await {
            Ok(admission) => Ok(admission),
            Err(e) => match self.config.failure_policy {
                FailurePolicy::Open => {
                    tracing::warn!(
                        store = %self.store.name(),
                        key = %key,
                        error = %e,
                        "Rate limit store unavailable, admitting request"
                    );
                    Ok(Admission::Admitted {
                        remaining: (policy.capacity - 1.0).max(0.0),
                    })
                }
                FailurePolicy::Closed => {
                    tracing::error!(
                        store = %self.store.name(),
                        key = %key,
                        error = %e,
                        "Rate limit store unavailable, rejecting request"
                    );
                    Err(RateLimitError::StoreUnavailable(e))
                }
            },
        }
    }

    async fn take_token(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        now: f64,
    ) -> Result<Admission, StoreError> {
        let fields = self.store.hash_get_all(key).await?;

        let remaining = match parse_bucket(&fields) {
            None => policy.capacity - 1.0,
            Some((tokens, last_refill)) => {
                let elapsed = (now - last_refill).max(0.0);
                let tokens = (tokens + elapsed * policy.refill_per_sec).min(policy.capacity);
                if tokens < 1.0 {
                    return Ok(Admission::Rejected {
                        retry_after: policy.retry_after(tokens),
                    });
                }
                tokens - 1.0
            }
        };

        self.store
            .hash_set(
                key,
                &[
                    (TOKENS_FIELD, remaining.to_string()),
                    (TIMESTAMP_FIELD, now.to_string()),
                ],
            )
            .await?;
        let ttl = policy.bucket_ttl(
            self.config.bucket_ttl_floor_secs,
            self.config.bucket_idle_ttl_secs,
        );
        self.store.expire(key, ttl).await?;

        Ok(Admission::Admitted { remaining })
    }
}

/// Decode a stored bucket. Missing or unreadable buckets start over as new.
fn parse_bucket(fields: &HashMap<String, String>) -> Option<(f64, f64)> {
    if fields.is_empty() {
        return None;
    }
    let tokens = fields.get(TOKENS_FIELD)?.parse::<f64>().ok()?;
    let timestamp = fields.get(TIMESTAMP_FIELD)?.parse::<f64>().ok()?;
    if !tokens.is_finite() || !timestamp.is_finite() {
        tracing::debug!("Discarding non-finite bucket state");
        return None;
    }
    Some((tokens.max(0.0), timestamp))
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Axum middleware: one bucket per client IP and request path.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<TokenBucketLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if !limiter.enabled() || path == "/health" {
        return next.run(request).await;
    }

    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let key = format!("ip:{}:{}", client, path);
    let policy = limiter.policy_for(&path);

    match limiter.admit(&key, &policy).await {
        Ok(Admission::Admitted { .. }) => next.run(request).await,
        Ok(Admission::Rejected { retry_after }) => {
            tracing::warn!(client = %client, path = %path, ?retry_after, "Rate limit exceeded");
            metrics::record_rate_limited(&route);
            ApiError::RateLimited { retry_after }.into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}
