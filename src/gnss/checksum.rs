//! # UBX Checksum
//!
//! 8-bit Fletcher checksum used by the UBX protocol.
//!
//! Computed over class, id, length and payload (everything except the two
//! sync bytes and the checksum itself):
//!
//! ```text
//! CK_A = CK_A + byte
//! CK_B = CK_B + CK_A
//! ```

/// Running UBX checksum accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UbxChecksum {
    ck_a: u8,
    ck_b: u8,
}

impl UbxChecksum {
    /// Start a new checksum with both accumulators at zero
    pub const fn new() -> Self {
        Self { ck_a: 0, ck_b: 0 }
    }

    /// Fold one byte into the checksum
    #[inline]
    pub fn update(&mut self, byte: u8) {
        self.ck_a = self.ck_a.wrapping_add(byte);
        self.ck_b = self.ck_b.wrapping_add(self.ck_a);
    }

    /// Current `(CK_A, CK_B)` pair
    pub fn value(&self) -> (u8, u8) {
        (self.ck_a, self.ck_b)
    }
}

/// Calculate the UBX checksum of a byte slice
///
/// # Arguments
///
/// * `data` - Class + Id + Length + Payload
///
/// # Returns
///
/// * `(u8, u8)` - `(CK_A, CK_B)`
///
/// # Examples
///
/// ```
/// use telemetry_concentrator::gnss::checksum::ubx_checksum;
///
/// // CFG-MSG enabling NAV-PVT at rate 1
/// let data = [0x06, 0x01, 0x03, 0x00, 0x01, 0x07, 0x01];
/// assert_eq!(ubx_checksum(&data), (0x13, 0x51));
/// ```
pub fn ubx_checksum(data: &[u8]) -> (u8, u8) {
    let mut checksum = UbxChecksum::new();
    for &byte in data {
        checksum.update(byte);
    }
    checksum.value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_empty() {
        assert_eq!(ubx_checksum(&[]), (0x00, 0x00));
    }

    #[test]
    fn test_checksum_known_vector() {
        // CFG-MSG: class 0x06, id 0x01, len 3, NAV-PVT rate 1
        let data = [0x06, 0x01, 0x03, 0x00, 0x01, 0x07, 0x01];
        assert_eq!(ubx_checksum(&data), (0x13, 0x51));
    }

    #[test]
    fn test_checksum_wraps() {
        let data = [0xFF; 4];
        // A: FF, FE, FD, FC ; B: FF, FD, FA, F6
        assert_eq!(ubx_checksum(&data), (0xFC, 0xF6));
    }

    #[test]
    fn test_incremental_matches_slice() {
        let data = [0x01, 0x07, 0x5C, 0x00, 0x10, 0x20, 0x30];
        let mut running = UbxChecksum::new();
        data.iter().for_each(|&b| running.update(b));
        assert_eq!(running.value(), ubx_checksum(&data));
    }

    #[test]
    fn test_checksum_changes_with_data() {
        let a = ubx_checksum(&[0x01, 0x07, 0x00, 0x04]);
        let b = ubx_checksum(&[0x01, 0x07, 0x00, 0x05]);
        assert_ne!(a, b, "Checksum should change when data changes");
    }

    #[test]
    fn test_checksum_detects_swapped_bytes() {
        // Plain additive sums miss reordering, CK_B does not
        let a = ubx_checksum(&[0x01, 0x02]);
        let b = ubx_checksum(&[0x02, 0x01]);
        assert_eq!(a.0, b.0);
        assert_ne!(a.1, b.1);
    }
}
