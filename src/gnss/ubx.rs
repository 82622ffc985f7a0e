//! # UBX Frame Decoder
//!
//! Byte-at-a-time state machine for the u-blox binary protocol.
//!
//! ```text
//! WaitSync1 --0xB5--> WaitSync2 --0x62--> Header --6 bytes--> Payload
//!     ^                   |                                     |
//!     +----other byte-----+                          len bytes  v
//!     +<----------------- frame delivered or dropped ------- Checksum
//! ```
//!
//! The decoder owns one fixed buffer and never allocates, so `feed` is safe
//! to call from a UART receive interrupt.

use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, warn};

use super::checksum::UbxChecksum;
use super::protocol::*;

/// Decoder state, named for the part of the frame expected next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    WaitSync1,
    WaitSync2,
    Header,
    Payload,
    Checksum,
}

/// A validated UBX message
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UbxMessage {
    /// NAV-PVT navigation solution
    NavPvt(GnssFix),

    /// Any other class/id; checksum was valid but the payload is not decoded
    Other { class: u8, id: u8, length: u16 },
}

/// Diagnostic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames with a valid checksum
    pub frames: u64,
    /// Frames dropped on checksum mismatch
    pub checksum_errors: u64,
    /// Frames whose declared length exceeded the buffer
    pub oversized: u64,
    /// Valid frames with an unusable payload (e.g. short NAV-PVT)
    pub malformed: u64,
}

/// Incremental UBX decoder
pub struct UbxDecoder {
    state: DecoderState,
    buf: [u8; UBX_BUFFER_SIZE],
    index: usize,
    payload_len: usize,
    checksum: UbxChecksum,
    stats: DecoderStats,
}

impl std::fmt::Debug for UbxDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UbxDecoder")
            .field("state", &self.state)
            .field("index", &self.index)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Default for UbxDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl UbxDecoder {
    /// Create a decoder waiting for the first sync byte
    pub fn new() -> Self {
        Self {
            state: DecoderState::WaitSync1,
            buf: [0u8; UBX_BUFFER_SIZE],
            index: 0,
            payload_len: 0,
            checksum: UbxChecksum::new(),
            stats: DecoderStats::default(),
        }
    }

    /// Current state
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Diagnostic counters since construction
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Discard any partial frame and wait for sync again
    pub fn reset(&mut self) {
        self.state = DecoderState::WaitSync1;
        self.index = 0;
        self.payload_len = 0;
        self.checksum = UbxChecksum::new();
    }

    /// Feed one byte
    ///
    /// # Returns
    ///
    /// * `Option<UbxMessage>` - A message when this byte completes a frame
    ///   with a valid checksum, `None` otherwise
    pub fn feed(&mut self, byte: u8) -> Option<UbxMessage> {
        match self.state {
            DecoderState::WaitSync1 => {
                if byte == UBX_SYNC_1 {
                    self.index = 0;
                    self.push(byte);
                    self.state = DecoderState::WaitSync2;
                }
                None
            }
            DecoderState::WaitSync2 => {
                if byte == UBX_SYNC_2 {
                    self.push(byte);
                    self.checksum = UbxChecksum::new();
                    self.state = DecoderState::Header;
                } else {
                    self.reset();
                }
                None
            }
            DecoderState::Header => {
                self.push(byte);
                self.checksum.update(byte);
                if self.index == UBX_HEADER_SIZE {
                    self.payload_len = u16::from_le_bytes([self.buf[4], self.buf[5]]) as usize;
                    if UBX_HEADER_SIZE + self.payload_len + UBX_CHECKSUM_SIZE > UBX_BUFFER_SIZE {
                        self.stats.oversized += 1;
                        warn!(
                            "UBX frame {:02X}/{:02X} declares {} payload bytes, dropping",
                            self.buf[2], self.buf[3], self.payload_len
                        );
                        self.reset();
                    } else if self.payload_len == 0 {
                        self.state = DecoderState::Checksum;
                    } else {
                        self.state = DecoderState::Payload;
                    }
                }
                None
            }
            DecoderState::Payload => {
                self.push(byte);
                self.checksum.update(byte);
                if self.index == UBX_HEADER_SIZE + self.payload_len {
                    self.state = DecoderState::Checksum;
                }
                None
            }
            DecoderState::Checksum => {
                self.push(byte);
                if self.index == UBX_HEADER_SIZE + self.payload_len + UBX_CHECKSUM_SIZE {
                    let message = self.finish();
                    self.reset();
                    message
                } else {
                    None
                }
            }
        }
    }

    /// Feed a whole chunk, collecting every completed message
    ///
    /// Produces the same messages as feeding the bytes one at a time.
    /// Allocates the result, so not for use from interrupt context.
    pub fn feed_all(&mut self, bytes: &[u8]) -> Vec<UbxMessage> {
        bytes.iter().filter_map(|&b| self.feed(b)).collect()
    }

    /// Store a byte; the length check in `Header` keeps `index` in bounds,
    /// anything else is treated as a malformed frame.
    fn push(&mut self, byte: u8) {
        match self.buf.get_mut(self.index) {
            Some(slot) => {
                *slot = byte;
                self.index += 1;
            }
            None => {
                self.stats.oversized += 1;
                warn!("UBX buffer overrun at index {}, dropping frame", self.index);
                self.reset();
            }
        }
    }

    /// Validate the checksum of the buffered frame and interpret it
    fn finish(&mut self) -> Option<UbxMessage> {
        let end = self.index;
        let found = (self.buf[end - 2], self.buf[end - 1]);
        let expected = self.checksum.value();
        let (class, id) = (self.buf[2], self.buf[3]);

        if found != expected {
            self.stats.checksum_errors += 1;
            warn!(
                "UBX checksum error on {:02X}/{:02X}: expected {:02X?}, got {:02X?}",
                class, id, expected, found
            );
            return None;
        }

        self.stats.frames += 1;
        let payload = &self.buf[UBX_HEADER_SIZE..UBX_HEADER_SIZE + self.payload_len];

        match (class, id) {
            (UBX_CLASS_NAV, UBX_ID_NAV_PVT) => match decode_nav_pvt(payload) {
                Some(fix) => {
                    debug!(
                        "UBX NAV-PVT: {} | lat {:.7} | lon {:.7} | alt {:.2} m | {} sats",
                        fix.fix_label(),
                        fix.latitude,
                        fix.longitude,
                        fix.altitude,
                        fix.satellites
                    );
                    Some(UbxMessage::NavPvt(fix))
                }
                None => {
                    self.stats.malformed += 1;
                    warn!("UBX NAV-PVT payload too short: {} bytes", payload.len());
                    None
                }
            },
            _ => {
                debug!("UBX message {:02X}/{:02X} ({} bytes) ignored", class, id, payload.len());
                Some(UbxMessage::Other { class, id, length: self.payload_len as u16 })
            }
        }
    }
}

/// Decode a NAV-PVT payload into a fix
///
/// # Arguments
///
/// * `payload` - NAV-PVT payload (92 bytes)
///
/// # Returns
///
/// * `Option<GnssFix>` - `None` if the payload is too short
pub fn decode_nav_pvt(payload: &[u8]) -> Option<GnssFix> {
    if payload.len() < UBX_NAV_PVT_PAYLOAD_SIZE {
        return None;
    }

    let year = u16::from_le_bytes([payload[4], payload[5]]);
    let (month, day) = (payload[6], payload[7]);
    let (hour, min, sec) = (payload[8], payload[9], payload[10]);
    let fix_type = payload[20];
    let satellites = payload[23];

    // Longitude/latitude: degrees × 10^7
    let lon = le_i32(payload, 24);
    let lat = le_i32(payload, 28);

    // Height above ellipsoid in millimeters
    let height = le_i32(payload, 32);

    Some(GnssFix {
        protocol: GnssProtocol::Ubx,
        fix_quality: fix_type,
        latitude: lat as f64 * 1e-7,
        longitude: lon as f64 * 1e-7,
        altitude: height as f64 / 1000.0,
        satellites,
        hdop: None,
        date: NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32),
        time: NaiveTime::from_hms_opt(hour as u32, min as u32, sec as u32),
    })
}

fn le_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gnss::encoder::encode_ubx_frame;

    /// NAV-PVT payload for São Paulo, 3D fix, 9 satellites, 760 m
    fn nav_pvt_payload() -> Vec<u8> {
        let mut p = vec![0u8; UBX_NAV_PVT_PAYLOAD_SIZE];
        p[4..6].copy_from_slice(&2024u16.to_le_bytes());
        p[6] = 5; // month
        p[7] = 17; // day
        p[8] = 14; // hour
        p[9] = 30; // min
        p[10] = 5; // sec
        p[20] = 3; // fixType
        p[23] = 9; // numSV
        p[24..28].copy_from_slice(&(-466_333_000i32).to_le_bytes());
        p[28..32].copy_from_slice(&(-235_505_000i32).to_le_bytes());
        p[32..36].copy_from_slice(&760_000i32.to_le_bytes());
        p
    }

    fn nav_pvt_frame() -> Vec<u8> {
        encode_ubx_frame(UBX_CLASS_NAV, UBX_ID_NAV_PVT, &nav_pvt_payload()).unwrap()
    }

    fn fixes(messages: &[UbxMessage]) -> Vec<GnssFix> {
        messages
            .iter()
            .filter_map(|m| match m {
                UbxMessage::NavPvt(fix) => Some(*fix),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_nav_pvt_example_frame() {
        let frame = nav_pvt_frame();
        assert_eq!(&frame[..6], &[0xB5, 0x62, 0x01, 0x07, 0x5C, 0x00]);
        assert_eq!(&frame[frame.len() - 2..], &[0x24, 0x95]);

        let mut decoder = UbxDecoder::new();
        let found = fixes(&decoder.feed_all(&frame));
        assert_eq!(found.len(), 1);

        let fix = found[0];
        assert_eq!(fix.fix_label(), "3D Fix");
        assert_eq!(fix.satellites, 9);
        assert!((fix.longitude - (-46.6333)).abs() < 1e-7);
        assert!((fix.latitude - (-23.5505)).abs() < 1e-7);
        assert!((fix.altitude - 760.0).abs() < 1e-9);
        assert_eq!(fix.datetime().unwrap().to_string(), "2024-05-17 14:30:05");
        assert_eq!(decoder.stats().frames, 1);
    }

    #[test]
    fn test_flipped_payload_bit_yields_no_fix() {
        let clean = nav_pvt_frame();

        for byte in UBX_HEADER_SIZE..UBX_HEADER_SIZE + UBX_NAV_PVT_PAYLOAD_SIZE {
            for bit in [0u8, 3, 7] {
                let mut frame = clean.clone();
                frame[byte] ^= 1 << bit;

                let mut decoder = UbxDecoder::new();
                assert!(
                    fixes(&decoder.feed_all(&frame)).is_empty(),
                    "Corrupted byte {} bit {} still produced a fix",
                    byte,
                    bit
                );
                assert_eq!(decoder.stats().checksum_errors, 1);
                assert_eq!(decoder.state(), DecoderState::WaitSync1);
            }
        }
    }

    #[test]
    fn test_chunk_size_independence() {
        let ack = encode_ubx_frame(0x05, 0x01, &[0x06, 0x8A]).unwrap();
        let mut stream = vec![0x00, 0xB5, 0x13];
        stream.extend_from_slice(&nav_pvt_frame());
        stream.extend_from_slice(b"$GNGGA,noise\r\n");
        stream.extend_from_slice(&ack);
        stream.extend_from_slice(&nav_pvt_frame());

        let mut one_by_one = UbxDecoder::new();
        let single: Vec<UbxMessage> = stream.iter().filter_map(|&b| one_by_one.feed(b)).collect();

        for chunk_size in [1usize, 2, 7, 64, stream.len()] {
            let mut batched = UbxDecoder::new();
            let mut messages = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                messages.extend(batched.feed_all(chunk));
            }
            assert_eq!(messages, single, "Chunk size {} changed the output", chunk_size);
        }

        assert_eq!(fixes(&single).len(), 2);
        assert_eq!(single.len(), 3);
    }

    #[test]
    fn test_sync1_ignores_other_bytes() {
        let mut decoder = UbxDecoder::new();
        for b in [0x00u8, 0x62, 0xFF, b'$'] {
            assert!(decoder.feed(b).is_none());
            assert_eq!(decoder.state(), DecoderState::WaitSync1);
        }
    }

    #[test]
    fn test_broken_sync_resets() {
        let mut decoder = UbxDecoder::new();
        decoder.feed(UBX_SYNC_1);
        assert_eq!(decoder.state(), DecoderState::WaitSync2);

        decoder.feed(0x00);
        assert_eq!(decoder.state(), DecoderState::WaitSync1);

        // A repeated first sync byte is not treated as a new start
        decoder.feed(UBX_SYNC_1);
        decoder.feed(UBX_SYNC_1);
        assert_eq!(decoder.state(), DecoderState::WaitSync1);
    }

    #[test]
    fn test_state_progression() {
        let frame = encode_ubx_frame(0x0A, 0x04, &[0x01, 0x02]).unwrap();
        let mut decoder = UbxDecoder::new();
        let expected = [
            DecoderState::WaitSync2,
            DecoderState::Header,
            DecoderState::Header,
            DecoderState::Header,
            DecoderState::Header,
            DecoderState::Payload,
            DecoderState::Payload,
            DecoderState::Checksum,
            DecoderState::Checksum,
            DecoderState::WaitSync1,
        ];

        for (byte, state) in frame.iter().zip(expected) {
            decoder.feed(*byte);
            assert_eq!(decoder.state(), state);
        }
    }

    #[test]
    fn test_other_message_reported() {
        let frame = encode_ubx_frame(0x05, 0x01, &[0x06, 0x8A]).unwrap();
        let mut decoder = UbxDecoder::new();
        let messages = decoder.feed_all(&frame);
        assert_eq!(messages, vec![UbxMessage::Other { class: 0x05, id: 0x01, length: 2 }]);
    }

    #[test]
    fn test_zero_length_payload() {
        let frame = encode_ubx_frame(0x0A, 0x04, &[]).unwrap();
        let mut decoder = UbxDecoder::new();
        assert_eq!(decoder.feed_all(&frame).len(), 1);
    }

    #[test]
    fn test_oversized_frame_dropped() {
        let mut decoder = UbxDecoder::new();
        let len = (UBX_MAX_PAYLOAD_SIZE + 1) as u16;
        let header = [0xB5, 0x62, 0x01, 0x07, len as u8, (len >> 8) as u8];
        assert!(decoder.feed_all(&header).is_empty());
        assert_eq!(decoder.state(), DecoderState::WaitSync1);
        assert_eq!(decoder.stats().oversized, 1);

        // Decoder recovers for the next good frame
        assert_eq!(fixes(&decoder.feed_all(&nav_pvt_frame())).len(), 1);
    }

    #[test]
    fn test_short_nav_pvt_is_malformed() {
        let frame = encode_ubx_frame(UBX_CLASS_NAV, UBX_ID_NAV_PVT, &[0u8; 40]).unwrap();
        let mut decoder = UbxDecoder::new();
        assert!(decoder.feed_all(&frame).is_empty());
        assert_eq!(decoder.stats().malformed, 1);
    }

    #[test]
    fn test_reset_discards_partial_frame() {
        let frame = nav_pvt_frame();
        let mut decoder = UbxDecoder::new();
        decoder.feed_all(&frame[..40]);
        assert_eq!(decoder.state(), DecoderState::Payload);

        decoder.reset();
        assert_eq!(decoder.state(), DecoderState::WaitSync1);
        assert_eq!(fixes(&decoder.feed_all(&frame)).len(), 1);
    }

    #[test]
    fn test_decode_nav_pvt_unknown_fix_type() {
        let mut payload = nav_pvt_payload();
        payload[20] = 9;
        let fix = decode_nav_pvt(&payload).unwrap();
        assert_eq!(fix.fix_label(), "Unknown");
    }

    #[test]
    fn test_decode_nav_pvt_invalid_date() {
        let mut payload = nav_pvt_payload();
        payload[6] = 0; // month 0 before the receiver has time
        let fix = decode_nav_pvt(&payload).unwrap();
        assert!(fix.date.is_none());
        assert!(fix.time.is_some());
    }
}
