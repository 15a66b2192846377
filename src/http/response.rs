//! Error responses.
//!
//! # Responsibilities
//! - Map subsystem errors to HTTP status codes
//! - Render a uniform JSON body: `{"error": <kind>, "detail": <text>}`
//!
//! # Design Decisions
//! - An open breaker (503) and an exhausted rate limit (429) are distinct
//!   kinds, so clients can tell "back off" from "the store is down"
//! - Raw backing-store failures are 502, deadline overruns 504

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;

use crate::cache::CacheError;
use crate::records::RecordError;
use crate::security::RateLimitError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{name} is open, backing store temporarily unavailable")]
    BreakerOpen { name: String },

    #[error("rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    #[error("{0}")]
    StoreUnavailable(String),

    #[error("{0}")]
    StoreTimeout(String),

    #[error("{0}")]
    CounterStoreUnavailable(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    /// Machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BreakerOpen { .. } => "breaker_open",
            ApiError::RateLimited { .. } => "rate_limit_exceeded",
            ApiError::StoreUnavailable(_) => "store_unavailable",
            ApiError::StoreTimeout(_) => "store_timeout",
            ApiError::CounterStoreUnavailable(_) => "cache_store_unavailable",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::BadRequest(_) => "bad_request",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BreakerOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::StoreUnavailable(_) => StatusCode::BAD_GATEWAY,
            ApiError::StoreTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::CounterStoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(kind = self.kind(), error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": self.kind(),
            "detail": self.to_string(),
        }));
        let mut response = (status, body).into_response();

        if let ApiError::RateLimited {
            retry_after: Some(after),
        } = &self
        {
            // Whole seconds, rounded up, never zero.
            let secs = after.as_secs_f64().ceil().max(1.0) as u64;
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<RecordError> for ApiError {
    fn from(error: RecordError) -> Self {
        match error {
            RecordError::NotFound(what) => ApiError::NotFound(what),
            RecordError::Conflict(detail) => ApiError::Conflict(detail),
            RecordError::BreakerOpen { name } => ApiError::BreakerOpen { name },
            e @ RecordError::Unavailable { .. } => ApiError::StoreUnavailable(e.to_string()),
            e @ RecordError::Timeout { .. } => ApiError::StoreTimeout(e.to_string()),
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(error: CacheError) -> Self {
        ApiError::CounterStoreUnavailable(error.to_string())
    }
}

impl From<RateLimitError> for ApiError {
    fn from(error: RateLimitError) -> Self {
        ApiError::CounterStoreUnavailable(error.to_string())
    }
}
