//! Common error types for the singing renderer

use thiserror::Error;

/// Common result type for shared operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the renderer crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A value could not be serialized for hashing
    #[error("Hash error: {0}")]
    Hash(#[from] serde_json::Error),

    /// Invalid score data or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
