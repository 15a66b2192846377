//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a backing store:
//!     → circuit_breaker.rs (fail fast while the store is Open)
//!     → timeouts.rs (enforce the per-call deadline)
//!     → outcome recorded: failures/timeouts count toward the threshold
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No transparent retries: a caller that sees an open breaker answers 503
//! - Wrap, don't inherit: breakers are applied by higher-order composition
//!   (`circuit_breaker::guard`, `records::guarded`)

pub mod circuit_breaker;
pub mod timeouts;

use std::sync::Arc;

use crate::config::BreakersConfig;

pub use circuit_breaker::{
    guard, BreakerError, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState,
};

/// The breakers protecting each backing store, built once at startup.
#[derive(Debug, Clone)]
pub struct StoreBreakers {
    pub relational: Arc<CircuitBreaker>,
    pub document: Arc<CircuitBreaker>,
}

impl StoreBreakers {
    pub fn from_config(config: &BreakersConfig) -> Self {
        Self {
            relational: Arc::new(CircuitBreaker::new(
                config.relational.name.clone(),
                config.relational.to_breaker_config(),
            )),
            document: Arc::new(CircuitBreaker::new(
                config.document.name.clone(),
                config.document.to_breaker_config(),
            )),
        }
    }

    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        vec![self.relational.snapshot(), self.document.snapshot()]
    }
}
