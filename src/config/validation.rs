//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, capacities >= 1)
//! - Check addresses and store URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::{AppConfig, BreakerConfig, StoreBackend};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address `{value}`")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: invalid store URL `{value}` ({reason})")]
    InvalidStoreUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("{field}: {reason}")]
    OutOfRange { field: String, reason: &'static str },

    #[error("breakers: relational and document breakers share the name `{0}`")]
    DuplicateBreakerName(String),

    #[error("observability.log_level: unknown level `{0}`")]
    UnknownLogLevel(String),
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.timeouts.request_secs == 0 {
        errors.push(out_of_range("timeouts.request_secs", "must be greater than 0"));
    }

    if config.store.backend == StoreBackend::Redis {
        check_store_url(&mut errors, "store.cache_url", &config.store.cache_url);
        check_store_url(&mut errors, "store.ratelimit_url", &config.store.ratelimit_url);
    }
    if config.store.op_timeout_ms == 0 {
        errors.push(out_of_range("store.op_timeout_ms", "must be greater than 0"));
    }

    check_breaker(&mut errors, "breakers.relational", &config.breakers.relational);
    check_breaker(&mut errors, "breakers.document", &config.breakers.document);
    if config.breakers.relational.name == config.breakers.document.name {
        errors.push(ValidationError::DuplicateBreakerName(
            config.breakers.relational.name.clone(),
        ));
    }

    let limits = &config.rate_limit;
    check_policy(&mut errors, "rate_limit", limits.capacity, limits.refill_per_sec);
    for (i, route) in limits.routes.iter().enumerate() {
        let field = format!("rate_limit.routes[{}]", i);
        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::OutOfRange {
                field: format!("{}.path_prefix", field),
                reason: "must start with '/'",
            });
        }
        check_policy(&mut errors, &field, route.capacity, route.refill_per_sec);
    }
    if limits.bucket_ttl_floor_secs == 0 {
        errors.push(out_of_range("rate_limit.bucket_ttl_floor_secs", "must be greater than 0"));
    }
    if limits.bucket_idle_ttl_secs == 0 {
        errors.push(out_of_range("rate_limit.bucket_idle_ttl_secs", "must be greater than 0"));
    }

    if config.cache.trend_ttl_secs == 0 {
        errors.push(out_of_range("cache.trend_ttl_secs", "must be greater than 0"));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !["trace", "debug", "info", "warn", "error", "off"].contains(&level.as_str()) {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn out_of_range(field: &str, reason: &'static str) -> ValidationError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        reason,
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_store_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "redis" | "rediss" | "redis+unix") => {}
        Ok(parsed) => errors.push(ValidationError::InvalidStoreUrl {
            field,
            value: value.to_string(),
            reason: format!("unsupported scheme `{}`", parsed.scheme()),
        }),
        Err(e) => errors.push(ValidationError::InvalidStoreUrl {
            field,
            value: value.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn check_breaker(errors: &mut Vec<ValidationError>, field: &str, breaker: &BreakerConfig) {
    if breaker.name.trim().is_empty() {
        errors.push(out_of_range(&format!("{}.name", field), "must not be empty"));
    }
    if breaker.failure_threshold == 0 {
        errors.push(out_of_range(
            &format!("{}.failure_threshold", field),
            "must be greater than 0",
        ));
    }
    if breaker.reset_timeout_secs == 0 {
        errors.push(out_of_range(
            &format!("{}.reset_timeout_secs", field),
            "must be greater than 0",
        ));
    }
}

fn check_policy(errors: &mut Vec<ValidationError>, field: &str, capacity: f64, refill: f64) {
    if !capacity.is_finite() || capacity < 1.0 {
        errors.push(out_of_range(
            &format!("{}.capacity", field),
            "must be a finite number >= 1",
        ));
    }
    if !refill.is_finite() || refill < 0.0 {
        errors.push(out_of_range(
            &format!("{}.refill_per_sec", field),
            "must be a finite number >= 0",
        ));
    }
}
