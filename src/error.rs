//! # Error Types
//!
//! Custom error types for the telemetry concentrator using `thiserror`.

use thiserror::Error;

use crate::telemetry::CodecError;

/// Main error type for the telemetry concentrator
#[derive(Debug, Error)]
pub enum ConcentratorError {
    /// GNSS wire protocol errors (frame building, command generation)
    #[error("GNSS protocol error: {0}")]
    GnssProtocol(String),

    /// Telemetry record encode/decode errors
    #[error("Telemetry codec error: {0}")]
    Codec(#[from] CodecError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Source address could not be parsed
    #[error("Invalid source address: {0}")]
    InvalidAddress(String),

    /// Advertising payload could not be built
    #[error("Advertisement error: {0}")]
    Advertisement(String),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// None of the candidate serial devices could be opened
    #[error("No GNSS serial device found (tried: {0})")]
    SerialPortNotFound(String),

    /// Uplink collaborator rejected a notification
    #[error("Uplink error: {0}")]
    Uplink(String),

    /// Aggregation worker could not be joined
    #[error("Worker error: {0}")]
    Worker(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the telemetry concentrator
pub type Result<T> = std::result::Result<T, ConcentratorError>;
