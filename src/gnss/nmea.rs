//! # NMEA Sentence Decoder
//!
//! Accumulates text bytes into lines and decodes `$GNGGA` fix sentences.
//!
//! Lines longer than the buffer are truncated: extra bytes are dropped, not
//! buffered. Any other sentence type is ignored.
//!
//! ## Coordinates
//!
//! GGA carries coordinates as `ddmm.mmmm`. This decoder splits the whole
//! degrees off with an integer division by 100 and adds the remaining
//! minutes **divided by 100**, not 60:
//!
//! ```text
//! 4807.038,N  ->  48 + 7.038 / 100  =  48.07038
//! ```
//!
//! Deployed sensor nodes encode it this way, so the shadow stays consistent
//! with their advertised values.

use chrono::NaiveTime;
use tracing::{debug, warn};

use super::protocol::*;

/// Why a GGA sentence produced no fix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentenceRejection {
    /// Fix quality indicator is zero or missing
    NoFix,
    /// A required field is empty or not numeric
    MissingField(&'static str),
    /// `*hh` checksum present and wrong
    BadChecksum { expected: u8, found: u8 },
    /// Line is not valid UTF-8
    NotText,
}

impl std::fmt::Display for SentenceRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoFix => write!(f, "no fix"),
            Self::MissingField(name) => write!(f, "missing or invalid {}", name),
            Self::BadChecksum { expected, found } => {
                write!(f, "checksum mismatch (expected {:02X}, found {:02X})", expected, found)
            }
            Self::NotText => write!(f, "not valid text"),
        }
    }
}

/// Diagnostic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NmeaStats {
    /// Complete lines seen
    pub lines: u64,
    /// GGA sentences that produced a fix
    pub fixes: u64,
    /// GGA sentences discarded
    pub rejected: u64,
    /// Lines that overflowed the buffer
    pub truncated: u64,
}

/// Incremental NMEA decoder
pub struct NmeaDecoder {
    buf: [u8; NMEA_LINE_CAPACITY],
    len: usize,
    overflowed: bool,
    stats: NmeaStats,
}

impl std::fmt::Debug for NmeaDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NmeaDecoder")
            .field("len", &self.len)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Default for NmeaDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl NmeaDecoder {
    /// Create a decoder with an empty line buffer
    pub fn new() -> Self {
        Self {
            buf: [0u8; NMEA_LINE_CAPACITY],
            len: 0,
            overflowed: false,
            stats: NmeaStats::default(),
        }
    }

    /// Diagnostic counters since construction
    pub fn stats(&self) -> NmeaStats {
        self.stats
    }

    /// Bytes currently buffered for the line in progress
    pub fn buffered(&self) -> usize {
        self.len
    }

    /// Drop the line in progress
    pub fn reset(&mut self) {
        self.len = 0;
        self.overflowed = false;
    }

    /// Feed one byte
    ///
    /// # Returns
    ///
    /// * `Option<GnssFix>` - A fix when this byte terminates a valid GGA line
    pub fn feed(&mut self, byte: u8) -> Option<GnssFix> {
        if byte != b'\n' {
            if self.len < NMEA_LINE_CAPACITY {
                self.buf[self.len] = byte;
                self.len += 1;
            } else {
                self.overflowed = true;
            }
            return None;
        }

        if self.overflowed {
            self.stats.truncated += 1;
            debug!("NMEA line exceeded {} bytes, truncated", NMEA_LINE_CAPACITY);
        }

        let len = self.len;
        self.reset();
        if len == 0 {
            return None;
        }
        self.stats.lines += 1;

        // Noise ahead of the tag (power-up garbage, stray UBX bytes) is skipped
        let raw = &self.buf[..len];
        let start = raw
            .windows(NMEA_GGA_TAG.len())
            .position(|window| window == NMEA_GGA_TAG.as_bytes())?;

        let line = match std::str::from_utf8(&raw[start..]) {
            Ok(line) => line.trim_end_matches('\r'),
            Err(_) => {
                self.stats.rejected += 1;
                debug!("NMEA line is {}", SentenceRejection::NotText);
                return None;
            }
        };

        match parse_gga(line) {
            Ok(fix) => {
                self.stats.fixes += 1;
                Some(fix)
            }
            Err(reason) => {
                self.stats.rejected += 1;
                warn!("Incomplete NMEA sentence or invalid fix: {}", reason);
                None
            }
        }
    }
}

/// Parse one `$GNGGA` sentence (without line terminator)
///
/// # Errors
///
/// Returns the reason the sentence produced no fix
pub fn parse_gga(sentence: &str) -> Result<GnssFix, SentenceRejection> {
    let body = verify_checksum(sentence)?;

    let mut fields = [""; GGA_FIELD_COUNT];
    for (slot, field) in fields.iter_mut().zip(body.split(NMEA_DELIMITER)) {
        *slot = field;
    }

    let fix_quality = fields[GGA_FIELD_FIX_QUALITY].parse::<u8>().unwrap_or(0);
    if fix_quality == 0 {
        return Err(SentenceRejection::NoFix);
    }

    let lat_hemisphere = hemisphere(fields[GGA_FIELD_LAT_HEMISPHERE], ['N', 'S'], "latitude hemisphere")?;
    let lon_hemisphere = hemisphere(fields[GGA_FIELD_LON_HEMISPHERE], ['E', 'W'], "longitude hemisphere")?;
    let latitude = decode_coordinate(fields[GGA_FIELD_LATITUDE], lat_hemisphere)
        .ok_or(SentenceRejection::MissingField("latitude"))?;
    let longitude = decode_coordinate(fields[GGA_FIELD_LONGITUDE], lon_hemisphere)
        .ok_or(SentenceRejection::MissingField("longitude"))?;
    let altitude = fields[GGA_FIELD_ALTITUDE]
        .parse::<f64>()
        .map_err(|_| SentenceRejection::MissingField("altitude"))?;

    Ok(GnssFix {
        protocol: GnssProtocol::Nmea,
        fix_quality,
        latitude,
        longitude,
        altitude,
        satellites: fields[GGA_FIELD_SATELLITES].parse().unwrap_or(0),
        hdop: fields[GGA_FIELD_HDOP].parse().ok(),
        date: None,
        time: parse_utc_time(fields[GGA_FIELD_TIME]),
    })
}

/// Convert `ddmm.mmmm` (or `dddmm.mmmm`) to signed decimal degrees
///
/// Minutes are divided by 100; see the module documentation.
///
/// # Examples
///
/// ```
/// use telemetry_concentrator::gnss::nmea::decode_coordinate;
///
/// let lat = decode_coordinate("4807.038", 'S').unwrap();
/// assert!((lat + 48.07038).abs() < 1e-9);
/// ```
pub fn decode_coordinate(raw: &str, hemisphere: char) -> Option<f64> {
    let value: f64 = raw.parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    let degrees = (value / 100.0).trunc();
    let minutes = value - degrees * 100.0;
    let decimal = degrees + minutes / 100.0;

    match hemisphere {
        'S' | 'W' => Some(-decimal),
        _ => Some(decimal),
    }
}

/// Parse `hhmmss` with optional fractional seconds
fn parse_utc_time(raw: &str) -> Option<NaiveTime> {
    let (whole, fraction) = raw.split_once('.').unwrap_or((raw, ""));
    if whole.len() != 6 || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let hour = whole[0..2].parse().ok()?;
    let min = whole[2..4].parse().ok()?;
    let sec = whole[4..6].parse().ok()?;
    let millis = if fraction.is_empty() {
        0
    } else {
        (parse_fraction(fraction)? * 1000.0).round() as u32
    };

    NaiveTime::from_hms_milli_opt(hour, min, sec, millis.min(999))
}

fn parse_fraction(fraction: &str) -> Option<f64> {
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits: f64 = fraction.parse().ok()?;
    Some(digits / 10f64.powi(fraction.len() as i32))
}

/// Single-letter hemisphere field, one of `allowed`
fn hemisphere(field: &str, allowed: [char; 2], name: &'static str) -> Result<char, SentenceRejection> {
    let mut chars = field.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if allowed.contains(&c) => Ok(c),
        _ => Err(SentenceRejection::MissingField(name)),
    }
}

/// Strip and verify the `*hh` suffix, returning the sentence body
///
/// A bare `*` (or none at all) is accepted without verification.
fn verify_checksum(sentence: &str) -> Result<&str, SentenceRejection> {
    let Some((body, suffix)) = sentence.split_once('*') else {
        return Ok(sentence);
    };

    let suffix = suffix.trim();
    if suffix.len() != 2 {
        return Ok(body);
    }
    let Ok(found) = u8::from_str_radix(suffix, 16) else {
        return Ok(body);
    };

    let expected = body
        .bytes()
        .skip_while(|&b| b == b'$')
        .fold(0u8, |acc, b| acc ^ b);

    if expected == found {
        Ok(body)
    } else {
        Err(SentenceRejection::BadChecksum { expected, found })
    }
}
