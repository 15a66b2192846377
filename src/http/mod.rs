//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers)
//!     → request.rs (request ID, trace span, request metrics)
//!     → security::rate_limit (token bucket per client and path)
//!     → api handlers
//!     → response.rs (errors rendered as JSON with a status per kind)
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::ApiError;
pub use server::{AppState, HttpServer};
