//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per client IP and path token bucket)
//!     → handlers
//! ```
//!
//! # Design Decisions
//! - Bucket state lives in the shared counter store, not in process memory
//! - Store outages follow an explicit failure policy (closed by default)

pub mod rate_limit;

pub use rate_limit::{
    rate_limit_middleware, Admission, RateLimitError, RateLimitPolicy, TokenBucketLimiter,
};
