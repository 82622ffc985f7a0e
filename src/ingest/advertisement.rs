//! # Advertising Data
//!
//! Length-type-value structures of a legacy advertising payload:
//!
//! ```text
//! [len][type][data: len-1 bytes] [len][type][data] ...
//! ```
//!
//! A zero length byte ends the payload.

use crate::error::{ConcentratorError, Result};
use crate::telemetry::TelemetryRecord;

/// AD type: flags
pub const AD_TYPE_FLAGS: u8 = 0x01;

/// AD type: complete local name
pub const AD_TYPE_COMPLETE_NAME: u8 = 0x09;

/// AD type: manufacturer specific data
pub const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

/// Flags value: BR/EDR not supported
pub const AD_FLAG_NO_BREDR: u8 = 0x04;

/// Shortest manufacturer data that can hold a record header
pub const MIN_MANUFACTURER_DATA_LEN: usize = 8;

/// Legacy advertising payload limit
pub const LEGACY_ADV_MAX_LEN: usize = 31;

/// One AD structure borrowed from a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdStructure<'a> {
    pub ad_type: u8,
    pub data: &'a [u8],
}

/// Iterator over the AD structures of a payload
///
/// Stops at a zero length byte or at a structure running past the end.
#[derive(Debug, Clone)]
pub struct AdStructures<'a> {
    remaining: &'a [u8],
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = AdStructure<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (&len, rest) = self.remaining.split_first()?;
        let len = len as usize;
        if len == 0 || len > rest.len() {
            self.remaining = &[];
            return None;
        }

        let (field, tail) = rest.split_at(len);
        self.remaining = tail;
        Some(AdStructure {
            ad_type: field[0],
            data: &field[1..],
        })
    }
}

/// Iterate over the AD structures of `payload`
pub fn structures(payload: &[u8]) -> AdStructures<'_> {
    AdStructures { remaining: payload }
}

/// First manufacturer data structure large enough to carry a record
pub fn manufacturer_data(payload: &[u8]) -> Option<&[u8]> {
    structures(payload)
        .find(|s| s.ad_type == AD_TYPE_MANUFACTURER_DATA && s.data.len() >= MIN_MANUFACTURER_DATA_LEN)
        .map(|s| s.data)
}

/// Complete local name, if present and valid UTF-8
pub fn local_name(payload: &[u8]) -> Option<&str> {
    structures(payload)
        .find(|s| s.ad_type == AD_TYPE_COMPLETE_NAME)
        .and_then(|s| std::str::from_utf8(s.data).ok())
}

/// Advertising payload for a record: flags followed by the encoded record
/// as manufacturer data
///
/// # Errors
///
/// Returns error if the payload exceeds the legacy advertising limit
pub fn build_advertising_data(record: &TelemetryRecord) -> Result<Vec<u8>> {
    let encoded = record.encode();
    let mut payload = Vec::with_capacity(LEGACY_ADV_MAX_LEN);
    push_structure(&mut payload, AD_TYPE_FLAGS, &[AD_FLAG_NO_BREDR])?;
    push_structure(&mut payload, AD_TYPE_MANUFACTURER_DATA, &encoded)?;
    Ok(payload)
}

/// Scan response payload carrying the complete local name
pub fn build_scan_response(name: &str) -> Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(LEGACY_ADV_MAX_LEN);
    push_structure(&mut payload, AD_TYPE_COMPLETE_NAME, name.as_bytes())?;
    Ok(payload)
}

fn push_structure(payload: &mut Vec<u8>, ad_type: u8, data: &[u8]) -> Result<()> {
    let total = payload.len() + 2 + data.len();
    if total > LEGACY_ADV_MAX_LEN {
        return Err(ConcentratorError::Advertisement(format!(
            "AD type 0x{:02X} needs {} bytes, limit is {}",
            ad_type, total, LEGACY_ADV_MAX_LEN
        )));
    }

    payload.push((data.len() + 1) as u8);
    payload.push(ad_type);
    payload.extend_from_slice(data);
    Ok(())
}
