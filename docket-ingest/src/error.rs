//! Error types for docket-ingest
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for the docket-ingest module
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level HTTP errors (connect, TLS, body read)
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Backend rejected the request (non-2xx with detail when available)
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("Response decode error: {0}")]
    Decode(String),

    /// Operation exceeded its configured timeout
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// File rejected before submission (unsupported type, unreadable)
    #[error("Invalid file {filename}: {reason}")]
    InvalidFile { filename: String, reason: String },
}

/// Convenience Result type using docket-ingest Error
pub type Result<T> = std::result::Result<T, Error>;
