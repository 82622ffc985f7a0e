//! # GNSS Module
//!
//! Incremental decoders for GNSS receiver output.
//!
//! This module handles:
//! - UBX binary frames (sync, header, payload, Fletcher checksum)
//! - NMEA text sentences (`$GNGGA` only)
//! - UBX receiver configuration commands
//! - Folding a decoded fix into a telemetry reading
//!
//! Both decoders take exactly one byte per call, never allocate and never
//! lock, so they can be driven straight from a UART receive path.

pub mod protocol;
pub mod checksum;
pub mod ubx;
pub mod nmea;
pub mod encoder;

pub use protocol::{GnssFix, GnssProtocol};

use nmea::NmeaDecoder;
use ubx::{UbxDecoder, UbxMessage};

/// Decoder for whichever protocol the receiver is configured to emit
#[derive(Debug)]
pub enum GnssDecoder {
    Ubx(UbxDecoder),
    Nmea(NmeaDecoder),
}

impl GnssDecoder {
    /// Create a decoder for `protocol` in its initial state
    pub fn new(protocol: GnssProtocol) -> Self {
        match protocol {
            GnssProtocol::Ubx => Self::Ubx(UbxDecoder::new()),
            GnssProtocol::Nmea => Self::Nmea(NmeaDecoder::new()),
        }
    }

    /// Protocol this decoder understands
    pub fn protocol(&self) -> GnssProtocol {
        match self {
            Self::Ubx(_) => GnssProtocol::Ubx,
            Self::Nmea(_) => GnssProtocol::Nmea,
        }
    }

    /// Feed one byte, returning a fix when one completes
    pub fn feed(&mut self, byte: u8) -> Option<GnssFix> {
        match self {
            Self::Ubx(decoder) => match decoder.feed(byte)? {
                UbxMessage::NavPvt(fix) => Some(fix),
                UbxMessage::Other { .. } => None,
            },
            Self::Nmea(decoder) => decoder.feed(byte),
        }
    }

    /// Drop any partially received frame or sentence
    pub fn reset(&mut self) {
        match self {
            Self::Ubx(decoder) => decoder.reset(),
            Self::Nmea(decoder) => decoder.reset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_matches_protocol() {
        assert_eq!(GnssDecoder::new(GnssProtocol::Ubx).protocol(), GnssProtocol::Ubx);
        assert_eq!(GnssDecoder::new(GnssProtocol::Nmea).protocol(), GnssProtocol::Nmea);
    }

    #[test]
    fn test_nmea_decoder_yields_fix() {
        let mut decoder = GnssDecoder::new(GnssProtocol::Nmea);
        let sentence = b"$GNGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,,,,*\r\n";

        let fixes: Vec<GnssFix> = sentence.iter().filter_map(|&b| decoder.feed(b)).collect();
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].protocol, GnssProtocol::Nmea);
    }

    #[test]
    fn test_ubx_decoder_ignores_nmea_text() {
        let mut decoder = GnssDecoder::new(GnssProtocol::Ubx);
        let sentence = b"$GNGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,,,,*\r\n";

        assert!(sentence.iter().all(|&b| decoder.feed(b).is_none()));
    }
}
