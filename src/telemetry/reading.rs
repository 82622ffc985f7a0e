//! # Sensor Readings
//!
//! Semantic (floating point) view of a record's values, with the fixed-point
//! scale factor of every kind.

use serde::Serialize;

use super::record::{SensorKind, RECORD_VALUE_COUNT};
use super::CodecError;

/// Temperature scale: centi-degrees Celsius
pub const TEMPERATURE_SCALE: f64 = 100.0;

/// Pressure scale: deci-hPa
pub const PRESSURE_SCALE: f64 = 10.0;

/// Acceleration scale: milli-g
pub const ACCEL_SCALE: f64 = 1000.0;

/// Angular rate scale: centi-degrees per second
pub const GYRO_SCALE: f64 = 100.0;

/// Latitude / longitude scale: 1e-7 degrees
pub const COORDINATE_SCALE: f64 = 1e7;

/// Altitude scale: millimeters
pub const ALTITUDE_SCALE: f64 = 1000.0;

/// A decoded sensor reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reading {
    /// Illuminance in lux
    Light { lux: i16 },

    /// Temperature in °C
    Temperature { celsius: f64 },

    /// Pressure in hPa
    Pressure { hpa: f64 },

    /// Temperature and pressure from one combined sensor
    Environmental { celsius: f64, hpa: f64 },

    /// Acceleration in g
    Acceleration { x: f64, y: f64, z: f64 },

    /// Angular rate in degrees per second
    Rotation { x: f64, y: f64, z: f64 },

    /// Position fix
    Gnss {
        fix_type: u8,
        latitude: f64,
        longitude: f64,
        altitude: f64,
    },

    /// Movement and posture flags
    Motion { moving: bool, standing: bool },
}

impl Reading {
    /// Record kind carrying this reading
    pub fn kind(&self) -> SensorKind {
        match self {
            Self::Light { .. } => SensorKind::Light,
            Self::Temperature { .. } => SensorKind::Temp,
            Self::Pressure { .. } => SensorKind::Pressure,
            Self::Environmental { .. } => SensorKind::Environmental,
            Self::Acceleration { .. } => SensorKind::Accel,
            Self::Rotation { .. } => SensorKind::Gyro,
            Self::Gnss { .. } => SensorKind::Gnss,
            Self::Motion { .. } => SensorKind::Motion,
        }
    }

    /// Scale into fixed-point wire values
    ///
    /// The returned vector holds exactly `kind().value_count()` values.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::OutOfRange` if a scaled value overflows its field
    pub fn to_values(&self) -> Result<Vec<i16>, CodecError> {
        let values = match *self {
            Self::Light { lux } => vec![lux],
            Self::Temperature { celsius } => vec![scale_i16("temperature", celsius, TEMPERATURE_SCALE)?],
            Self::Pressure { hpa } => vec![scale_i16("pressure", hpa, PRESSURE_SCALE)?],
            Self::Environmental { celsius, hpa } => vec![
                scale_i16("temperature", celsius, TEMPERATURE_SCALE)?,
                scale_i16("pressure", hpa, PRESSURE_SCALE)?,
            ],
            Self::Acceleration { x, y, z } => vec![
                scale_i16("accel.x", x, ACCEL_SCALE)?,
                scale_i16("accel.y", y, ACCEL_SCALE)?,
                scale_i16("accel.z", z, ACCEL_SCALE)?,
            ],
            Self::Rotation { x, y, z } => vec![
                scale_i16("gyro.x", x, GYRO_SCALE)?,
                scale_i16("gyro.y", y, GYRO_SCALE)?,
                scale_i16("gyro.z", z, GYRO_SCALE)?,
            ],
            Self::Gnss {
                fix_type,
                latitude,
                longitude,
                altitude,
            } => {
                let (lat_hi, lat_lo) = split_i32(scale_i32("latitude", latitude, COORDINATE_SCALE)?);
                let (lon_hi, lon_lo) = split_i32(scale_i32("longitude", longitude, COORDINATE_SCALE)?);
                let (alt_hi, alt_lo) = split_i32(scale_i32("altitude", altitude, ALTITUDE_SCALE)?);
                vec![i16::from(fix_type), lat_hi, lat_lo, lon_hi, lon_lo, alt_hi, alt_lo]
            }
            Self::Motion { moving, standing } => vec![i16::from(moving), i16::from(standing)],
        };
        Ok(values)
    }

    /// Interpret fixed-point wire values for `kind`
    ///
    /// # Errors
    ///
    /// Returns `CodecError::NoReading` for `SensorKind::Error`
    pub fn from_values(kind: SensorKind, values: &[i16; RECORD_VALUE_COUNT]) -> Result<Self, CodecError> {
        let v = |i: usize| f64::from(values[i]);
        Ok(match kind {
            SensorKind::Error => return Err(CodecError::NoReading(kind)),
            SensorKind::Light => Self::Light { lux: values[0] },
            SensorKind::Temp => Self::Temperature {
                celsius: v(0) / TEMPERATURE_SCALE,
            },
            SensorKind::Pressure => Self::Pressure {
                hpa: v(0) / PRESSURE_SCALE,
            },
            SensorKind::Environmental => Self::Environmental {
                celsius: v(0) / TEMPERATURE_SCALE,
                hpa: v(1) / PRESSURE_SCALE,
            },
            SensorKind::Accel => Self::Acceleration {
                x: v(0) / ACCEL_SCALE,
                y: v(1) / ACCEL_SCALE,
                z: v(2) / ACCEL_SCALE,
            },
            SensorKind::Gyro => Self::Rotation {
                x: v(0) / GYRO_SCALE,
                y: v(1) / GYRO_SCALE,
                z: v(2) / GYRO_SCALE,
            },
            SensorKind::Gnss => Self::Gnss {
                // Fix type travels in the low byte of the first value
                fix_type: (values[0] & 0xFF) as u8,
                latitude: f64::from(join_i32(values[1], values[2])) / COORDINATE_SCALE,
                longitude: f64::from(join_i32(values[3], values[4])) / COORDINATE_SCALE,
                altitude: f64::from(join_i32(values[5], values[6])) / ALTITUDE_SCALE,
            },
            SensorKind::Motion => Self::Motion {
                moving: values[0] != 0,
                standing: values[1] != 0,
            },
        })
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Light { lux } => write!(f, "Light: {} lx", lux),
            Self::Temperature { celsius } => write!(f, "Temperature: {:.2} °C", celsius),
            Self::Pressure { hpa } => write!(f, "Pressure: {:.1} hPa", hpa),
            Self::Environmental { celsius, hpa } => {
                write!(f, "Environment: {:.2} °C, {:.1} hPa", celsius, hpa)
            }
            Self::Acceleration { x, y, z } => {
                write!(f, "Acceleration: x={:.3} y={:.3} z={:.3} g", x, y, z)
            }
            Self::Rotation { x, y, z } => {
                write!(f, "Rotation: x={:.2} y={:.2} z={:.2} dps", x, y, z)
            }
            Self::Gnss {
                fix_type,
                latitude,
                longitude,
                altitude,
            } => write!(
                f,
                "GNSS: fix {} lat {:.7} lon {:.7} alt {:.2} m",
                fix_type, latitude, longitude, altitude
            ),
            Self::Motion { moving, standing } => write!(
                f,
                "Motion: {}, {}",
                if *moving { "moving" } else { "still" },
                if *standing { "standing" } else { "lying" }
            ),
        }
    }
}

fn scale_i16(field: &'static str, value: f64, scale: f64) -> Result<i16, CodecError> {
    let scaled = (value * scale).round();
    if !(f64::from(i16::MIN)..=f64::from(i16::MAX)).contains(&scaled) {
        return Err(CodecError::OutOfRange { field, value });
    }
    Ok(scaled as i16)
}

fn scale_i32(field: &'static str, value: f64, scale: f64) -> Result<i32, CodecError> {
    let scaled = (value * scale).round();
    if !(f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&scaled) {
        return Err(CodecError::OutOfRange { field, value });
    }
    Ok(scaled as i32)
}

/// Split into (high, low) 16-bit halves
fn split_i32(value: i32) -> (i16, i16) {
    ((value >> 16) as i16, (value & 0xFFFF) as u16 as i16)
}

/// Rebuild a 32-bit value from its (high, low) halves
pub fn join_i32(hi: i16, lo: i16) -> i32 {
    (i32::from(hi) << 16) | i32::from(lo as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(reading: &Reading) -> [i16; RECORD_VALUE_COUNT] {
        let mut values = [0; RECORD_VALUE_COUNT];
        let scaled = reading.to_values().unwrap();
        values[..scaled.len()].copy_from_slice(&scaled);
        values
    }

    #[test]
    fn test_value_count_matches_kind() {
        let readings = [
            Reading::Light { lux: 1 },
            Reading::Temperature { celsius: 1.0 },
            Reading::Pressure { hpa: 1.0 },
            Reading::Environmental { celsius: 1.0, hpa: 1.0 },
            Reading::Acceleration { x: 0.0, y: 0.0, z: 1.0 },
            Reading::Rotation { x: 0.0, y: 0.0, z: 0.0 },
            Reading::Gnss { fix_type: 3, latitude: 0.0, longitude: 0.0, altitude: 0.0 },
            Reading::Motion { moving: false, standing: true },
        ];
        for reading in readings {
            assert_eq!(reading.to_values().unwrap().len(), reading.kind().value_count());
        }
    }

    #[test]
    fn test_scale_factors() {
        assert_eq!(Reading::Temperature { celsius: 23.45 }.to_values().unwrap(), vec![2345]);
        assert_eq!(Reading::Pressure { hpa: 1013.2 }.to_values().unwrap(), vec![10132]);
        assert_eq!(
            Reading::Acceleration { x: 0.5, y: -1.0, z: 0.001 }.to_values().unwrap(),
            vec![500, -1000, 1]
        );
        assert_eq!(
            Reading::Rotation { x: 1.5, y: -2.25, z: 0.0 }.to_values().unwrap(),
            vec![150, -225, 0]
        );
    }

    #[test]
    fn test_quantization_rounds() {
        assert_eq!(Reading::Temperature { celsius: 20.006 }.to_values().unwrap(), vec![2001]);
        assert_eq!(Reading::Temperature { celsius: -20.004 }.to_values().unwrap(), vec![-2000]);
    }

    #[test]
    fn test_gnss_halves() {
        let reading = Reading::Gnss {
            fix_type: 3,
            latitude: -23.5505,
            longitude: -46.6333,
            altitude: 760.0,
        };
        let values = reading.to_values().unwrap();

        // -235505000 = 0xF1F6_7A98
        assert_eq!(values[0], 3);
        assert_eq!(values[1], 0xF1F6_u16 as i16);
        assert_eq!(values[2], 0x7A98_u16 as i16);
        // 760000 = 0x000B_98C0, low half has its sign bit set
        assert_eq!(values[5], 0x000B);
        assert_eq!(values[6], 0x98C0_u16 as i16);

        match Reading::from_values(SensorKind::Gnss, &wire(&reading)).unwrap() {
            Reading::Gnss { fix_type, latitude, longitude, altitude } => {
                assert_eq!(fix_type, 3);
                assert!((latitude + 23.5505).abs() < 1e-7);
                assert!((longitude + 46.6333).abs() < 1e-7);
                assert!((altitude - 760.0).abs() < 1e-3);
            }
            other => panic!("expected GNSS reading, got {:?}", other),
        }
    }

    #[test]
    fn test_join_inverts_split() {
        for value in [0, 1, -1, i32::MAX, i32::MIN, 0x0000_8000, -0x0000_8000, 123_456_789] {
            let (hi, lo) = split_i32(value);
            assert_eq!(join_i32(hi, lo), value);
        }
    }

    #[test]
    fn test_from_values_inverts_to_values() {
        let readings = [
            Reading::Light { lux: -7 },
            Reading::Temperature { celsius: -40.25 },
            Reading::Pressure { hpa: 1100.0 },
            Reading::Environmental { celsius: 85.0, hpa: 300.5 },
            Reading::Acceleration { x: 2.0, y: -2.0, z: 0.125 },
            Reading::Rotation { x: 250.0, y: -250.0, z: 0.5 },
            Reading::Motion { moving: true, standing: true },
        ];
        for reading in readings {
            let decoded = Reading::from_values(reading.kind(), &wire(&reading)).unwrap();
            assert_eq!(decoded, reading);
        }
    }

    #[test]
    fn test_out_of_range() {
        assert!(matches!(
            Reading::Temperature { celsius: 400.0 }.to_values(),
            Err(CodecError::OutOfRange { field: "temperature", .. })
        ));
        assert!(matches!(
            Reading::Acceleration { x: 0.0, y: 40.0, z: 0.0 }.to_values(),
            Err(CodecError::OutOfRange { field: "accel.y", .. })
        ));
        assert!(matches!(
            Reading::Gnss { fix_type: 3, latitude: 0.0, longitude: 0.0, altitude: 3_000_000.0 }.to_values(),
            Err(CodecError::OutOfRange { field: "altitude", .. })
        ));
        assert!(Reading::Pressure { hpa: f64::NAN }.to_values().is_err());
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(Reading::Pressure { hpa: 1013.2 }.to_string(), "Pressure: 1013.2 hPa");
        assert_eq!(
            Reading::Motion { moving: false, standing: true }.to_string(),
            "Motion: still, standing"
        );
        assert_eq!(Reading::Light { lux: 312 }.to_string(), "Light: 312 lx");
    }
}
