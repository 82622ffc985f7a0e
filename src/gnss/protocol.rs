//! # GNSS Protocol Constants and Types
//!
//! Wire constants for the UBX and NMEA protocols and the decoded fix type
//! shared by both decoders.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;

use crate::telemetry::Reading;

/// First UBX sync byte (always 0xB5)
pub const UBX_SYNC_1: u8 = 0xB5;

/// Second UBX sync byte (always 0x62)
pub const UBX_SYNC_2: u8 = 0x62;

/// UBX header size: sync(2) + class(1) + id(1) + length(2)
pub const UBX_HEADER_SIZE: usize = 6;

/// UBX trailing checksum size (CK_A, CK_B)
pub const UBX_CHECKSUM_SIZE: usize = 2;

/// Largest payload the decoder buffers; longer frames are dropped
pub const UBX_MAX_PAYLOAD_SIZE: usize = 256;

/// Decoder buffer size: header + largest payload + checksum
pub const UBX_BUFFER_SIZE: usize = UBX_HEADER_SIZE + UBX_MAX_PAYLOAD_SIZE + UBX_CHECKSUM_SIZE;

/// NAV message class
pub const UBX_CLASS_NAV: u8 = 0x01;

/// CFG message class
pub const UBX_CLASS_CFG: u8 = 0x06;

/// NAV-PVT message id (navigation position/velocity/time solution)
pub const UBX_ID_NAV_PVT: u8 = 0x07;

/// CFG-MSG message id (legacy message rate configuration)
pub const UBX_ID_CFG_MSG: u8 = 0x01;

/// CFG-VALSET message id (key/value configuration)
pub const UBX_ID_CFG_VALSET: u8 = 0x8A;

/// NAV-PVT payload size
pub const UBX_NAV_PVT_PAYLOAD_SIZE: usize = 92;

/// NMEA sentence line buffer size (bytes beyond this are dropped)
pub const NMEA_LINE_CAPACITY: usize = 256;

/// The only NMEA sentence the text decoder interprets
pub const NMEA_GGA_TAG: &str = "$GNGGA";

/// NMEA field delimiter
pub const NMEA_DELIMITER: char = ',';

/// GGA field positions
pub const GGA_FIELD_TIME: usize = 1;
pub const GGA_FIELD_LATITUDE: usize = 2;
pub const GGA_FIELD_LAT_HEMISPHERE: usize = 3;
pub const GGA_FIELD_LONGITUDE: usize = 4;
pub const GGA_FIELD_LON_HEMISPHERE: usize = 5;
pub const GGA_FIELD_FIX_QUALITY: usize = 6;
pub const GGA_FIELD_SATELLITES: usize = 7;
pub const GGA_FIELD_HDOP: usize = 8;
pub const GGA_FIELD_ALTITUDE: usize = 9;

/// Number of leading GGA fields the parser looks at
pub const GGA_FIELD_COUNT: usize = GGA_FIELD_ALTITUDE + 1;

/// Wire protocol a fix was decoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GnssProtocol {
    /// u-blox binary protocol
    Ubx,
    /// NMEA 0183 text sentences
    Nmea,
}

impl std::fmt::Display for GnssProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ubx => write!(f, "UBX"),
            Self::Nmea => write!(f, "NMEA"),
        }
    }
}

/// Label for a UBX NAV-PVT `fixType` code
pub fn ubx_fix_label(fix_type: u8) -> &'static str {
    match fix_type {
        0 => "No Fix",
        1 => "Dead Reckoning",
        2 => "2D Fix",
        3 => "3D Fix",
        4 => "GNSS + DR Combined",
        5 => "Time Only Fix",
        _ => "Unknown",
    }
}

/// Label for an NMEA GGA fix quality indicator
pub fn nmea_quality_label(quality: u8) -> &'static str {
    match quality {
        0 => "Invalid",
        1 => "GPS Fix",
        2 => "DGPS Fix",
        3 => "PPS Fix",
        4 => "RTK Fixed",
        5 => "RTK Float",
        6 => "Dead Reckoning",
        7 => "Manual Input",
        8 => "Simulation",
        _ => "Unknown",
    }
}

/// A position solution decoded from either protocol
///
/// The two decoders follow different coordinate conventions: UBX reports
/// exact 1e-7 degree integers, while the NMEA decoder adds raw minutes
/// divided by 100 to the whole degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GnssFix {
    /// Protocol that produced this fix
    pub protocol: GnssProtocol,

    /// Raw fix code (UBX `fixType` or GGA quality indicator)
    pub fix_quality: u8,

    /// Latitude in degrees (negative = south)
    pub latitude: f64,

    /// Longitude in degrees (negative = west)
    pub longitude: f64,

    /// Altitude in meters
    pub altitude: f64,

    /// Satellites used in the solution
    pub satellites: u8,

    /// Horizontal dilution of precision (GGA only)
    pub hdop: Option<f32>,

    /// UTC date (UBX only, GGA carries no date)
    pub date: Option<NaiveDate>,

    /// UTC time of day
    pub time: Option<NaiveTime>,
}

impl GnssFix {
    /// Descriptive label for the fix quality code
    pub fn fix_label(&self) -> &'static str {
        match self.protocol {
            GnssProtocol::Ubx => ubx_fix_label(self.fix_quality),
            GnssProtocol::Nmea => nmea_quality_label(self.fix_quality),
        }
    }

    /// Full UTC timestamp when both date and time are known
    pub fn datetime(&self) -> Option<NaiveDateTime> {
        Some(NaiveDateTime::new(self.date?, self.time?))
    }

    /// Convert into the telemetry reading carried over the air
    pub fn to_reading(&self) -> Reading {
        Reading::Gnss {
            fix_type: self.fix_quality,
            latitude: self.latitude,
            longitude: self.longitude,
            altitude: self.altitude,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fix(protocol: GnssProtocol, fix_quality: u8) -> GnssFix {
        GnssFix {
            protocol,
            fix_quality,
            latitude: -23.5505,
            longitude: -46.6333,
            altitude: 760.0,
            satellites: 9,
            hdop: None,
            date: NaiveDate::from_ymd_opt(2024, 5, 17),
            time: NaiveTime::from_hms_opt(14, 30, 5),
        }
    }

    #[test]
    fn test_frame_constants() {
        assert_eq!(UBX_SYNC_1, 0xB5);
        assert_eq!(UBX_SYNC_2, 0x62);
        assert_eq!(UBX_HEADER_SIZE, 6);
        assert_eq!(UBX_BUFFER_SIZE, 264);
        assert_eq!(NMEA_GGA_TAG.len(), 6);
    }

    #[test]
    fn test_ubx_fix_labels() {
        assert_eq!(ubx_fix_label(0), "No Fix");
        assert_eq!(ubx_fix_label(3), "3D Fix");
        assert_eq!(ubx_fix_label(5), "Time Only Fix");
        assert_eq!(ubx_fix_label(6), "Unknown");
        assert_eq!(ubx_fix_label(0xFF), "Unknown");
    }

    #[test]
    fn test_fix_label_depends_on_protocol() {
        assert_eq!(sample_fix(GnssProtocol::Ubx, 1).fix_label(), "Dead Reckoning");
        assert_eq!(sample_fix(GnssProtocol::Nmea, 1).fix_label(), "GPS Fix");
    }

    #[test]
    fn test_datetime_requires_date_and_time() {
        let fix = sample_fix(GnssProtocol::Ubx, 3);
        let datetime = fix.datetime().unwrap();
        assert_eq!(datetime.to_string(), "2024-05-17 14:30:05");

        let mut no_date = fix;
        no_date.date = None;
        assert!(no_date.datetime().is_none());
    }

    #[test]
    fn test_to_reading() {
        let reading = sample_fix(GnssProtocol::Ubx, 3).to_reading();
        assert_eq!(
            reading,
            Reading::Gnss { fix_type: 3, latitude: -23.5505, longitude: -46.6333, altitude: 760.0 }
        );
    }
}
