//! Production dashboard API library.
//!
//! Resilience and traffic-control layer for a manufacturing yield dashboard:
//! circuit breakers around the relational and document stores, a distributed
//! token-bucket rate limiter and a cache-aside layer, both backed by a shared
//! Redis-compatible counter store.

pub mod api;
pub mod cache;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod records;
pub mod resilience;
pub mod security;
pub mod store;

pub use config::AppConfig;
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
