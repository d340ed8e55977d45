//! Error types for the svcreg crates.
//!
//! Library code returns `Result<T>` and propagates with `?`. The HTTP
//! layer converts these into status codes; the binary wraps them in
//! `anyhow` for reporting.

use thiserror::Error;

/// Result type alias for svcreg operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for svcreg operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A requested resource was not found.
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Invalid input (e.g. a registration without a service name).
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// The registry answered with something other than success.
    #[error("Registry error: {0}")]
    Registry(String),

    /// Transport-level failure (connection refused, timeout, bad URI).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error (wraps std::io::Error).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Creates a NotFound error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Creates a Validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}
