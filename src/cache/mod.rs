//! Cache-aside subsystem.
//!
//! # Data Flow
//! ```text
//! handler
//!     → key.rs (namespace + sha256 of canonical params)
//!     → aside.rs: store.get ─ hit ──────────────────────▶ response
//!                          └ miss → compute → store.set ─▶ response
//!
//! write handler
//!     → aside.rs: invalidate_namespace (keys_matching + delete)
//! ```

pub mod aside;
pub mod key;

pub use aside::{CacheAside, CacheError};
pub use key::{derive_key, CacheParams};
