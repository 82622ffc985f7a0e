//! # Telemetry Record
//!
//! Wire format shared by every sensor class, little-endian:
//!
//! ```text
//! offset  size  field
//! 0       2     source tag (provider id)
//! 2       1     kind
//! 3       1     padding (0)
//! 4       4     timestamp, ms since source boot
//! 8       N     values, i16 each, N depends on kind
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::reading::Reading;
use super::CodecError;

/// Provider tag carried by every record from our sensor nodes
pub const DEFAULT_PROVIDER_TAG: u16 = 0x0059;

/// Record header size: tag(2) + kind(1) + padding(1) + timestamp(4)
pub const RECORD_HEADER_SIZE: usize = 8;

/// Number of value slots in a record
pub const RECORD_VALUE_COUNT: usize = 8;

/// Largest encoded record (GNSS)
pub const RECORD_MAX_SIZE: usize = RECORD_HEADER_SIZE + 14;

/// Sensor class of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SensorKind {
    Error = 0,
    Light = 1,
    Temp = 2,
    Pressure = 3,
    Environmental = 4,
    Accel = 5,
    Gyro = 6,
    Gnss = 7,
    Motion = 8,
}

impl SensorKind {
    /// Payload size in bytes following the header
    pub const fn payload_len(self) -> usize {
        match self {
            Self::Error => 0,
            Self::Light | Self::Temp | Self::Pressure => 2,
            Self::Environmental | Self::Motion => 4,
            Self::Accel | Self::Gyro => 6,
            // fix type, lat hi/lo, lon hi/lo, alt hi/lo
            Self::Gnss => 14,
        }
    }

    /// Number of i16 values in the payload
    pub const fn value_count(self) -> usize {
        self.payload_len() / 2
    }
}

impl TryFrom<u8> for SensorKind {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, CodecError> {
        Ok(match value {
            0 => Self::Error,
            1 => Self::Light,
            2 => Self::Temp,
            3 => Self::Pressure,
            4 => Self::Environmental,
            5 => Self::Accel,
            6 => Self::Gyro,
            7 => Self::Gnss,
            8 => Self::Motion,
            other => return Err(CodecError::UnknownKind(other)),
        })
    }
}

/// One telemetry record
///
/// Value slots beyond the kind's payload are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryRecord {
    /// Provider identifier
    pub source_tag: u16,

    /// Sensor class
    pub kind: SensorKind,

    /// Milliseconds since source boot
    pub timestamp: u32,

    /// Fixed-point values, interpretation depends on `kind`
    pub values: [i16; RECORD_VALUE_COUNT],
}

impl TelemetryRecord {
    /// Create a record with all values zero
    pub fn new(source_tag: u16, kind: SensorKind, timestamp: u32) -> Self {
        Self {
            source_tag,
            kind,
            timestamp,
            values: [0; RECORD_VALUE_COUNT],
        }
    }

    /// Build a record from a semantic reading
    ///
    /// # Errors
    ///
    /// Returns `CodecError::OutOfRange` if a scaled value does not fit
    pub fn from_reading(source_tag: u16, timestamp: u32, reading: &Reading) -> Result<Self, CodecError> {
        let mut record = Self::new(source_tag, reading.kind(), timestamp);
        let values = reading.to_values()?;
        record.values[..values.len()].copy_from_slice(&values);
        Ok(record)
    }

    /// Interpret the values as a semantic reading
    ///
    /// # Errors
    ///
    /// Returns `CodecError::NoReading` for `Error` records
    pub fn reading(&self) -> Result<Reading, CodecError> {
        Reading::from_values(self.kind, &self.values)
    }

    /// Encoded size in bytes
    pub fn wire_len(&self) -> usize {
        RECORD_HEADER_SIZE + self.kind.payload_len()
    }

    /// Encode to wire bytes (header + payload for this kind only)
    ///
    /// # Examples
    ///
    /// ```
    /// use telemetry_concentrator::telemetry::{Reading, TelemetryRecord};
    ///
    /// let record = TelemetryRecord::from_reading(0x0059, 1000, &Reading::Temperature { celsius: 23.45 })?;
    /// let bytes = record.encode();
    /// assert_eq!(bytes.len(), 10);
    /// assert_eq!(&bytes[..4], &[0x59, 0x00, 0x02, 0x00]);
    /// # Ok::<(), telemetry_concentrator::telemetry::CodecError>(())
    /// ```
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        buf.put_u16_le(self.source_tag);
        buf.put_u8(self.kind as u8);
        buf.put_u8(0);
        buf.put_u32_le(self.timestamp);
        for &value in &self.values[..self.kind.value_count()] {
            buf.put_i16_le(value);
        }
        buf.freeze()
    }

    /// Decode a record from wire bytes
    ///
    /// Bytes past the kind's payload are ignored.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The kind byte is not recognized
    /// - The buffer is shorter than header + payload
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < RECORD_HEADER_SIZE {
            return Err(CodecError::TooShort {
                expected: RECORD_HEADER_SIZE,
                actual: data.len(),
            });
        }

        let kind = SensorKind::try_from(data[2])?;
        let expected = RECORD_HEADER_SIZE + kind.payload_len();
        if data.len() < expected {
            return Err(CodecError::TooShort {
                expected,
                actual: data.len(),
            });
        }

        let mut buf = &data[..expected];
        let source_tag = buf.get_u16_le();
        buf.advance(2); // kind + padding
        let timestamp = buf.get_u32_le();

        let mut record = Self::new(source_tag, kind, timestamp);
        for value in record.values.iter_mut().take(kind.value_count()) {
            *value = buf.get_i16_le();
        }
        Ok(record)
    }

    /// Provider tag of an encoded record, without decoding the rest
    pub fn peek_source_tag(data: &[u8]) -> Option<u16> {
        match data {
            [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
            _ => None,
        }
    }
}

impl std::fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.reading() {
            Ok(reading) => write!(f, "{} @ {} ms", reading, self.timestamp),
            Err(_) => write!(f, "{:?} @ {} ms", self.kind, self.timestamp),
        }
    }
}
