//! # Shadow State
//!
//! Latest known value of every tracked sensor group. Each record kind
//! overwrites only its own group; nothing else is retained.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use serde::Serialize;

use crate::telemetry::reading::{join_i32, ALTITUDE_SCALE, COORDINATE_SCALE, PRESSURE_SCALE, TEMPERATURE_SCALE};
use crate::telemetry::{Reading, TelemetryRecord};

/// Size of the packed shadow
pub const SHADOW_PACKED_SIZE: usize = 25;

/// Aggregated state, raw fixed-point values as received
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShadowState {
    /// Worker receive time of the last record, ms since pipeline start
    pub updated_at: u32,

    /// Centi-degrees Celsius
    pub temperature: i16,

    /// Deci-hPa
    pub pressure: u16,

    /// 1e-7 degrees
    pub latitude: i32,

    /// 1e-7 degrees
    pub longitude: i32,

    /// Millimeters
    pub altitude: i32,

    pub fix_type: u8,
    pub movement: u8,
    pub posture: u8,

    /// Lux
    pub light: i16,
}

impl ShadowState {
    /// Fold one record into the state
    ///
    /// Every record stamps `updated_at`. Returns `false` for kinds the
    /// shadow has no group for (accel, gyro, error); their values are not
    /// stored.
    pub fn fold(&mut self, record: &TelemetryRecord, received_at: u32) -> bool {
        self.updated_at = received_at;

        let Ok(reading) = record.reading() else {
            return false;
        };

        let v = &record.values;
        match reading {
            Reading::Light { .. } => self.light = v[0],
            Reading::Temperature { .. } => self.temperature = v[0],
            Reading::Pressure { .. } => self.pressure = v[0] as u16,
            Reading::Environmental { .. } => {
                self.temperature = v[0];
                self.pressure = v[1] as u16;
            }
            Reading::Gnss { fix_type, .. } => {
                self.fix_type = fix_type;
                self.latitude = join_i32(v[1], v[2]);
                self.longitude = join_i32(v[3], v[4]);
                self.altitude = join_i32(v[5], v[6]);
            }
            Reading::Motion { moving, standing } => {
                self.movement = u8::from(moving);
                self.posture = u8::from(standing);
            }
            Reading::Acceleration { .. } | Reading::Rotation { .. } => return false,
        }

        true
    }

    /// Packed little-endian form served to uplink readers
    ///
    /// ```text
    /// updated_at u32 | temperature i16 | pressure u16 | latitude i32 |
    /// longitude i32 | altitude i32 | fix_type u8 | movement u8 |
    /// posture u8 | light i16
    /// ```
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(SHADOW_PACKED_SIZE);
        buf.put_u32_le(self.updated_at);
        buf.put_i16_le(self.temperature);
        buf.put_u16_le(self.pressure);
        buf.put_i32_le(self.latitude);
        buf.put_i32_le(self.longitude);
        buf.put_i32_le(self.altitude);
        buf.put_u8(self.fix_type);
        buf.put_u8(self.movement);
        buf.put_u8(self.posture);
        buf.put_i16_le(self.light);
        buf.freeze()
    }

    /// Scaled view for formatting
    pub fn view(&self) -> ShadowView {
        ShadowView {
            updated_at: self.updated_at,
            temperature_c: f64::from(self.temperature) / TEMPERATURE_SCALE,
            pressure_hpa: f64::from(self.pressure) / PRESSURE_SCALE,
            latitude: f64::from(self.latitude) / COORDINATE_SCALE,
            longitude: f64::from(self.longitude) / COORDINATE_SCALE,
            altitude_m: f64::from(self.altitude) / ALTITUDE_SCALE,
            fix_type: self.fix_type,
            moving: self.movement != 0,
            standing: self.posture != 0,
            light_lux: self.light,
        }
    }
}

/// Shadow in engineering units
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShadowView {
    pub updated_at: u32,
    pub temperature_c: f64,
    pub pressure_hpa: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
    pub fix_type: u8,
    pub moving: bool,
    pub standing: bool,
    pub light_lux: i16,
}

/// Shadow shared between the aggregation worker and readers
///
/// Readers get copies; the lock is never held outside these methods.
#[derive(Debug, Clone, Default)]
pub struct SharedShadow {
    inner: Arc<Mutex<ShadowState>>,
}

impl SharedShadow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ShadowState {
        *self.inner.lock()
    }

    /// Fold a record, returning the updated copy and whether a sensor
    /// group changed
    pub fn update(&self, record: &TelemetryRecord, received_at: u32) -> (ShadowState, bool) {
        let mut state = self.inner.lock();
        let folded = state.fold(record, received_at);
        (*state, folded)
    }
}
