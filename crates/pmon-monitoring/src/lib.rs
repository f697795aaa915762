//! # pmon-monitoring
//!
//! HTTP health checks for supervised processes.
//!
//! Checks never fail the caller: transport errors, timeouts and unexpected
//! status codes all come back as an unhealthy [`HealthCheckData`]. Only a
//! malformed endpoint is reported as an error.

pub mod http;

pub use http::{check_http_health, check_http_health_with_config, health_check_ok, HttpHealthCheckConfig};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Health check error types.
#[derive(Error, Debug)]
pub enum HealthCheckError {
    #[error("Health check endpoint invalid: {id} - {reason}")]
    InvalidEndpoint { id: String, reason: String },

    #[error("Health check client unavailable: {reason}")]
    ClientUnavailable { reason: String },
}

/// Result type for health check operations.
pub type HealthCheckResult<T> = Result<T, HealthCheckError>;

/// Outcome of one health probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckData {
    pub is_healthy: bool,
    pub checked_at: DateTime<Utc>,
    pub response_time_ms: Option<u64>,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
}

impl HealthCheckData {
    pub fn healthy(status_code: u16, response_time_ms: u64) -> Self {
        Self {
            is_healthy: true,
            checked_at: Utc::now(),
            response_time_ms: Some(response_time_ms),
            status_code: Some(status_code),
            error_message: None,
        }
    }

    pub fn unhealthy(status_code: Option<u16>, response_time_ms: u64, reason: impl Into<String>) -> Self {
        Self {
            is_healthy: false,
            checked_at: Utc::now(),
            response_time_ms: Some(response_time_ms),
            status_code,
            error_message: Some(reason.into()),
        }
    }
}
