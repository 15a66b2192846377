//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, environment overrides)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → handed to lifecycle::startup, which builds the subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Store failure policies are explicit settings, never implied

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AppConfig, BreakerConfig, BreakersConfig, CacheConfig, FailurePolicy, ListenerConfig,
    LogFormat, ObservabilityConfig, RateLimitConfig, RouteLimitConfig, SeedConfig, StoreBackend,
    StoreConfig, TimeoutConfig,
};
