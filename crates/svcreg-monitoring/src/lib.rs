//! # svcreg Monitoring
//!
//! Liveness probing for registered service instances.
//!
//! This crate provides:
//! - A single-shot HTTP heartbeat check with a hard timeout (`http`)
//! - The `Prober` trait and `HttpProber`, which wraps the single-shot
//!   check in a bounded retry policy (`prober`)

pub mod http;
pub mod prober;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors from a single heartbeat attempt.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Heartbeat timeout: {endpoint}")]
    Timeout { endpoint: String },

    #[error("Heartbeat connection failed: {endpoint} - {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Heartbeat endpoint invalid: {endpoint} - {reason}")]
    InvalidUrl { endpoint: String, reason: String },
}

/// Result type for single heartbeat attempts.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Outcome of one HTTP round trip that reached the instance.
#[derive(Debug, Clone)]
pub struct HealthCheckData {
    pub is_healthy: bool,
    pub status_code: u16,
    pub checked_at: DateTime<Utc>,
    pub response_time_ms: u64,
    pub error_message: Option<String>,
}

// Re-export main types
pub use http::{check_http_health, new_client, HttpCheckConfig, HttpClient};
pub use prober::{HttpProber, ProbeOutcome, ProbePolicy, Prober};
