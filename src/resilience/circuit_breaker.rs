//! Circuit breaker for backing-store protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: store assumed down, calls fail fast
//! - Half-Open: a single probe call tests whether the store recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: first call attempt after reset_timeout (lazy, no timer)
//! Half-Open → Closed: probe succeeds (failure count reset)
//! Half-Open → Open: probe fails (fresh reset_timeout window)
//! ```
//!
//! # Design Decisions
//! - One breaker per backing store, constructed at startup and injected
//! - State is process-local; replicas do not share their view of store health
//! - A success in Closed resets the consecutive failure count
//! - Only one probe in Half-Open; concurrent callers are rejected as Open
//! - The state lock is never held across an `.await`

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::observability::metrics;
use crate::resilience::timeouts::within;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

/// Breaker tuning.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time spent Open before a probe is allowed.
    pub reset_timeout: Duration,
    /// Deadline for each guarded call; an elapsed deadline counts as a failure.
    pub call_timeout: Option<Duration>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            call_timeout: None,
        }
    }
}

/// Errors returned by a guarded call.
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// The circuit is open; the operation was not invoked.
    #[error("circuit breaker `{name}` is open")]
    Open { name: String },

    /// The operation exceeded the breaker's call timeout.
    #[error("call guarded by `{name}` timed out after {after:?}")]
    Timeout { name: String, after: Duration },

    /// The operation ran and failed.
    #[error("{0}")]
    Failed(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    fn is_timeout(&self) -> bool {
        matches!(self, BreakerError::Timeout { .. })
    }
}

/// Point-in-time view of a breaker, for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    /// Seconds until a probe is allowed, while Open.
    pub retry_in_secs: Option<f64>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// How a call was admitted; decides how its outcome is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permit {
    Normal,
    Probe,
}

/// Consecutive-failure circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            breaker = %name,
            failure_threshold = config.failure_threshold,
            reset_timeout_secs = config.reset_timeout.as_secs_f64(),
            call_timeout_ms = config.call_timeout.map(|d| d.as_millis() as u64),
            "Circuit breaker initialized"
        );
        metrics::record_breaker_state(&name, CircuitState::Closed);

        Self {
            name,
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state. An Open breaker whose reset timeout has passed still
    /// reports Open until the next call attempt moves it to Half-Open.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        let retry_in_secs = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(at)) => Some(
                self.config
                    .reset_timeout
                    .saturating_sub(at.elapsed())
                    .as_secs_f64(),
            ),
            _ => None,
        };
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            failure_threshold: self.config.failure_threshold,
            retry_in_secs,
        }
    }

    /// Execute `operation` under breaker protection.
    ///
    /// Any `Err` from the operation, or an elapsed call timeout, counts as a
    /// failure. While Open the operation is never invoked.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.acquire().ok_or_else(|| BreakerError::Open {
            name: self.name.clone(),
        })?;

        let mut probe = ProbeGuard {
            breaker: self,
            armed: permit == Permit::Probe,
        };

        let started = Instant::now();
        let outcome = match within(self.config.call_timeout, operation()).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(BreakerError::Failed(e)),
            Err(elapsed) => Err(BreakerError::Timeout {
                name: self.name.clone(),
                after: elapsed.0,
            }),
        };
        probe.armed = false;

        match &outcome {
            Ok(_) => self.on_success(permit),
            Err(e) => self.on_failure(permit, started.elapsed(), e.is_timeout()),
        }
        outcome
    }

    /// Force the circuit open, e.g. during planned maintenance of a store.
    pub fn force_open(&self) {
        warn!(breaker = %self.name, "Circuit breaker forced open");
        let mut inner = self.inner.lock();
        self.open(&mut inner);
    }

    /// Force the circuit closed and clear the failure count.
    pub fn force_closed(&self) {
        warn!(breaker = %self.name, "Circuit breaker forced closed");
        let mut inner = self.inner.lock();
        self.close(&mut inner);
    }

    fn acquire(&self) -> Option<Permit> {
        let mut inner = self.inner.lock();
        let state = inner.state;
        match state {
            CircuitState::Closed => Some(Permit::Normal),
            CircuitState::Open => {
                let ready = inner
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.config.reset_timeout);
                if ready {
                    inner.state = CircuitState::HalfOpen;
                    inner.opened_at = None;
                    inner.probe_in_flight = true;
                    metrics::record_breaker_state(&self.name, CircuitState::HalfOpen);
                    info!(breaker = %self.name, "Circuit breaker half-open (probing)");
                    Some(Permit::Probe)
                } else {
                    drop(inner);
                    self.reject();
                    None
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    drop(inner);
                    self.reject();
                    None
                } else {
                    inner.probe_in_flight = true;
                    Some(Permit::Probe)
                }
            }
        }
    }

    fn reject(&self) {
        metrics::record_breaker_rejected(&self.name);
        warn!(breaker = %self.name, "Call rejected, circuit open");
    }

    fn on_success(&self, permit: Permit) {
        let mut inner = self.inner.lock();
        match (permit, inner.state) {
            (Permit::Probe, CircuitState::HalfOpen) => self.close(&mut inner),
            (Permit::Normal, CircuitState::Closed) => inner.failure_count = 0,
            // A slow call from before the circuit opened; it proves nothing.
            _ => {}
        }
    }

    fn on_failure(&self, permit: Permit, duration: Duration, timed_out: bool) {
        let mut inner = self.inner.lock();
        debug!(
            breaker = %self.name,
            duration_ms = duration.as_millis() as u64,
            timed_out,
            "Guarded call failed"
        );
        match (permit, inner.state) {
            (Permit::Probe, CircuitState::HalfOpen) => {
                inner.probe_in_flight = false;
                self.open(&mut inner);
            }
            (Permit::Normal, CircuitState::Closed) => {
                inner.failure_count = inner.failure_count.saturating_add(1);
                if inner.failure_count >= self.config.failure_threshold {
                    self.open(&mut inner);
                }
            }
            _ => {}
        }
    }

    fn open(&self, inner: &mut BreakerState) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.probe_in_flight = false;
        metrics::record_breaker_state(&self.name, CircuitState::Open);
        error!(
            breaker = %self.name,
            failure_count = inner.failure_count,
            failure_threshold = self.config.failure_threshold,
            reset_timeout_secs = self.config.reset_timeout.as_secs_f64(),
            "Circuit breaker opened (failing fast)"
        );
    }

    fn close(&self, inner: &mut BreakerState) {
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
        metrics::record_breaker_state(&self.name, CircuitState::Closed);
        info!(breaker = %self.name, "Circuit breaker closed (recovered)");
    }
}

/// Releases the Half-Open probe slot if the probing future is dropped before
/// it completes, so a cancelled request cannot wedge the breaker.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.breaker.inner.lock();
            if inner.state == CircuitState::HalfOpen {
                inner.probe_in_flight = false;
            }
        }
    }
}

/// Wrap a one-argument async operation so every invocation goes through
/// `breaker`. Zero-argument operations take `()`.
pub fn guard<A, T, E, F, Fut>(
    breaker: Arc<CircuitBreaker>,
    operation: F,
) -> impl Fn(A) -> BoxFuture<'static, Result<T, BreakerError<E>>> + Send + Sync
where
    A: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let operation = Arc::new(operation);
    move |arg: A| {
        let breaker = breaker.clone();
        let operation = operation.clone();
        Box::pin(async move { breaker.call(move || (*operation)(arg)).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::sleep;

    fn breaker(threshold: u32, reset_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test_breaker",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                reset_timeout: Duration::from_millis(reset_ms),
                call_timeout: None,
            },
        )
    }

    async fn fail(circuit: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        circuit.call(|| async { Err::<(), _>("boom") }).await
    }

    #[tokio::test]
    async fn test_normal_operation() {
        let circuit = breaker(3, 100);
        assert_eq!(circuit.state(), CircuitState::Closed);

        let result = circuit.call(|| async { Ok::<_, String>("ok") }).await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(circuit.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_opens_after_threshold_and_fails_fast() {
        let circuit = breaker(5, 10_000);
        for i in 1..=5 {
            assert!(matches!(fail(&circuit).await, Err(BreakerError::Failed("boom"))));
            if i < 5 {
                assert_eq!(circuit.state(), CircuitState::Closed);
            }
        }
        assert_eq!(circuit.state(), CircuitState::Open);

        let invoked = AtomicU32::new(0);
        let result = circuit
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Open { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let circuit = breaker(3, 10_000);
        let _ = fail(&circuit).await;
        let _ = fail(&circuit).await;
        assert_eq!(circuit.failure_count(), 2);

        circuit.call(|| async { Ok::<_, String>(()) }).await.unwrap();
        assert_eq!(circuit.failure_count(), 0);

        let _ = fail(&circuit).await;
        let _ = fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_probe_success_closes() {
        let circuit = breaker(5, 50);
        for _ in 0..5 {
            let _ = fail(&circuit).await;
        }
        assert_eq!(circuit.state(), CircuitState::Open);

        sleep(Duration::from_millis(60)).await;

        let result = circuit.call(|| async { Ok::<_, String>("recovered") }).await;
        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_probe_failure_reopens_with_fresh_window() {
        let circuit = breaker(5, 50);
        for _ in 0..5 {
            let _ = fail(&circuit).await;
        }
        sleep(Duration::from_millis(60)).await;

        assert!(matches!(fail(&circuit).await, Err(BreakerError::Failed(_))));
        assert_eq!(circuit.state(), CircuitState::Open);

        // The window restarted at the probe failure, so an immediate call is rejected.
        let result = circuit.call(|| async { Ok::<_, String>(()) }).await;
        assert!(result.unwrap_err().is_open());

        sleep(Duration::from_millis(60)).await;
        assert!(circuit.call(|| async { Ok::<_, String>(()) }).await.is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_single_probe_in_half_open() {
        let circuit = Arc::new(breaker(1, 20));
        let _ = fail(&circuit).await;
        sleep(Duration::from_millis(30)).await;

        let slow = {
            let circuit = circuit.clone();
            tokio::spawn(async move {
                circuit
                    .call(|| async {
                        sleep(Duration::from_millis(100)).await;
                        Ok::<_, String>(())
                    })
                    .await
            })
        };
        sleep(Duration::from_millis(20)).await;
        assert_eq!(circuit.state(), CircuitState::HalfOpen);

        let concurrent = circuit.call(|| async { Ok::<_, String>(()) }).await;
        assert!(concurrent.unwrap_err().is_open());

        assert!(slow.await.unwrap().is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_cancelled_probe_releases_slot() {
        let circuit = breaker(1, 20);
        let _ = fail(&circuit).await;
        sleep(Duration::from_millis(30)).await;

        let probe = circuit.call(|| async {
            sleep(Duration::from_secs(10)).await;
            Ok::<_, String>(())
        });
        let _ = tokio::time::timeout(Duration::from_millis(10), probe).await;

        assert_eq!(circuit.state(), CircuitState::HalfOpen);
        assert!(circuit.call(|| async { Ok::<_, String>(()) }).await.is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_call_timeout_counts_as_failure() {
        let circuit = CircuitBreaker::new(
            "slow_store",
            CircuitBreakerConfig {
                failure_threshold: 1,
                reset_timeout: Duration::from_secs(30),
                call_timeout: Some(Duration::from_millis(10)),
            },
        );

        let result = circuit
            .call(|| async {
                sleep(Duration::from_millis(200)).await;
                Ok::<_, String>(())
            })
            .await;
        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert!(!err.is_open());
        assert_eq!(circuit.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_force_operations() {
        let circuit = breaker(1, 1_000);
        circuit.force_open();
        assert_eq!(circuit.state(), CircuitState::Open);
        assert!(circuit.snapshot().retry_in_secs.is_some());

        circuit.force_closed();
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_guard_wraps_operation() {
        let circuit = Arc::new(breaker(2, 10_000));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let lookup = guard(circuit.clone(), move |id: u32| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if id == 0 {
                    Err("missing")
                } else {
                    Ok(id * 2)
                }
            }
        });

        assert_eq!(lookup(21).await.unwrap(), 42);
        assert!(lookup(0).await.is_err());
        assert!(lookup(0).await.is_err());
        assert!(lookup(21).await.unwrap_err().is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
