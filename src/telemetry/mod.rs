//! # Telemetry Module
//!
//! The compact, type-tagged sensor record carried in advertising payloads.
//!
//! This module handles:
//! - The 8-byte record header (provider tag, kind, padding, timestamp)
//! - Per-kind payload lengths and fixed-point scale factors
//! - Conversion between semantic readings and wire values
//! - Motion classification from raw IMU samples

pub mod record;
pub mod reading;
pub mod motion;

use thiserror::Error;

pub use reading::Reading;
pub use record::{SensorKind, TelemetryRecord, DEFAULT_PROVIDER_TAG};

/// Errors raised while encoding or decoding telemetry records
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    /// Kind byte outside the recognized set
    #[error("unknown sensor kind {0}")]
    UnknownKind(u8),

    /// Buffer shorter than the header plus the kind's payload
    #[error("record too short: expected {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    /// Scaled value does not fit its fixed-point field
    #[error("{field} value {value} is outside the representable range")]
    OutOfRange { field: &'static str, value: f64 },

    /// Kind carries no sensor reading
    #[error("{0:?} records carry no reading")]
    NoReading(SensorKind),
}
