//! Common error types for docket

use thiserror::Error;

/// Common result type for docket operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across docket crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error (wraps toml::de::Error)
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}
