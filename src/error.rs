//! # Error Types
//!
//! Custom error types for the Spektrum satellite decoder using `thiserror`.

use thiserror::Error;

/// Main error type for the decoder
#[derive(Debug, Error)]
pub enum SpektrumError {
    /// No repeating 32-byte structure found within the bounded scan
    #[error("Synchronization failure: {0}")]
    SynchronizationFailure(String),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// None of the candidate serial devices could be opened
    #[error("No serial device found (tried: {0})")]
    SerialPortNotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Decoded frame output errors
    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

/// Result type alias for the decoder
pub type Result<T> = std::result::Result<T, SpektrumError>;
