//! # UBX Frame Encoder
//!
//! Builds UBX frames and the receiver configuration commands sent at
//! start-up (NMEA output off, NAV-PVT on).

use super::checksum::ubx_checksum;
use super::protocol::*;
use crate::error::{ConcentratorError, Result};

/// CFG-VALSET layer bit for RAM
pub const CFG_LAYER_RAM: u8 = 0x01;

/// Configuration keys that disable NMEA standard messages on UART1
///
/// Key values are little-endian u32 on the wire, each followed by a one-byte
/// value.
pub const NMEA_UART1_OUTPUT_KEYS: [(&str, u32); 6] = [
    ("GSV", 0x2091_00C5),
    ("GLL", 0x2091_00CA),
    ("GSA", 0x2091_00C0),
    ("VTG", 0x2091_00B1),
    ("RMC", 0x2091_00AC),
    ("GGA", 0x2091_00BB),
];

/// Encode a complete UBX frame
///
/// # Arguments
///
/// * `class` - Message class
/// * `id` - Message id
/// * `payload` - Message payload
///
/// # Returns
///
/// * `Result<Vec<u8>>` - sync + header + payload + checksum
///
/// # Errors
///
/// Returns error if the payload does not fit the 16-bit length field
///
/// # Examples
///
/// ```
/// use telemetry_concentrator::gnss::encoder::encode_ubx_frame;
///
/// let frame = encode_ubx_frame(0x06, 0x01, &[0x01, 0x07, 0x01])?;
/// assert_eq!(frame, [0xB5, 0x62, 0x06, 0x01, 0x03, 0x00, 0x01, 0x07, 0x01, 0x13, 0x51]);
/// # Ok::<(), telemetry_concentrator::error::ConcentratorError>(())
/// ```
pub fn encode_ubx_frame(class: u8, id: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let length = u16::try_from(payload.len()).map_err(|_| {
        ConcentratorError::GnssProtocol(format!(
            "Payload size {} exceeds UBX length field",
            payload.len()
        ))
    })?;

    let mut frame = Vec::with_capacity(UBX_HEADER_SIZE + payload.len() + UBX_CHECKSUM_SIZE);
    frame.push(UBX_SYNC_1);
    frame.push(UBX_SYNC_2);
    frame.push(class);
    frame.push(id);
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(payload);

    // Checksum covers class, id, length and payload
    let (ck_a, ck_b) = ubx_checksum(&frame[2..]);
    frame.push(ck_a);
    frame.push(ck_b);

    Ok(frame)
}

/// CFG-VALSET frame writing `value` to every key in `keys`
pub fn encode_cfg_valset(layers: u8, keys: &[u32], value: u8) -> Result<Vec<u8>> {
    // version, layers, reserved(2)
    let mut payload = vec![0x00, layers, 0x00, 0x00];
    for key in keys {
        payload.extend_from_slice(&key.to_le_bytes());
        payload.push(value);
    }
    encode_ubx_frame(UBX_CLASS_CFG, UBX_ID_CFG_VALSET, &payload)
}

/// CFG-VALSET frame disabling NMEA standard messages on UART1 (RAM layer)
pub fn disable_nmea_output() -> Result<Vec<u8>> {
    let keys: Vec<u32> = NMEA_UART1_OUTPUT_KEYS.iter().map(|&(_, key)| key).collect();
    encode_cfg_valset(CFG_LAYER_RAM, &keys, 0)
}

/// CFG-MSG frame enabling NAV-PVT output on every navigation solution
pub fn enable_nav_pvt() -> Result<Vec<u8>> {
    encode_ubx_frame(UBX_CLASS_CFG, UBX_ID_CFG_MSG, &[UBX_CLASS_NAV, UBX_ID_NAV_PVT, 0x01])
}

/// Commands that switch a u-blox receiver to NAV-PVT only, in send order
pub fn receiver_setup_commands() -> Result<Vec<Vec<u8>>> {
    Ok(vec![disable_nmea_output()?, enable_nav_pvt()?])
}
