//! Frame checksums
//!
//! Each vendor protects its frames with its own checksum:
//! - Anviz: reflected CRC-16 (polynomial 0x8408, init 0xFFFF, no final XOR),
//!   transmitted low byte first.
//! - Soyal: an XOR byte seeded with 0xFF followed by a modulo-256 sum that
//!   includes the XOR byte itself.

use tracing::trace;

/// Reflected form of the CCITT polynomial.
const CRC16_POLY: u16 = 0x8408;

/// Lookup table shared by every Anviz encoder and decoder.
static CRC16_TABLE: [u16; 256] = build_crc16_table();

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC16_POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Calculate the Anviz CRC-16 of `data`
///
/// # Examples
///
/// ```
/// use punchwire_core::checksum;
///
/// let crc = checksum::crc16(&[0xA5, 0x00, 0x00, 0x00, 0x01, 0x32, 0x00, 0x00]);
/// assert_eq!(crc.to_le_bytes(), [0x52, 0xB9]);
/// ```
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;

    for &byte in data {
        crc ^= byte as u16;
        crc = (crc >> 8) ^ CRC16_TABLE[(crc & 0xFF) as usize];
    }

    trace!(
        len = data.len(),
        crc = format!("0x{:04X}", crc),
        "Calculated CRC-16"
    );

    crc
}

/// Verify an Anviz CRC-16 as it appears on the wire (low byte first)
pub fn verify_crc16(data: &[u8], wire: [u8; 2]) -> bool {
    crc16(data) == u16::from_le_bytes(wire)
}

/// Calculate the Soyal `(xor, sum)` trailer over `destination..payload`
///
/// ```text
/// xor = 0xFF ^ b0 ^ b1 ^ ... ^ bn
/// sum = (b0 + b1 + ... + bn + xor) mod 256
/// ```
///
/// # Examples
///
/// ```
/// use punchwire_core::checksum;
///
/// assert_eq!(checksum::xor_sum(&[0x01, 0x18]), (0xE6, 0xFF));
/// ```
pub fn xor_sum(data: &[u8]) -> (u8, u8) {
    let mut xor: u8 = 0xFF;
    let mut sum: u8 = 0;

    for &byte in data {
        xor ^= byte;
        sum = sum.wrapping_add(byte);
    }

    (xor, sum.wrapping_add(xor))
}

/// Verify a Soyal trailer
pub fn verify_xor_sum(data: &[u8], xor: u8, sum: u8) -> bool {
    xor_sum(data) == (xor, sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_table_matches_published_values() {
        assert_eq!(CRC16_TABLE[0], 0x0000);
        assert_eq!(CRC16_TABLE[1], 0x1189);
        assert_eq!(CRC16_TABLE[2], 0x2312);
        assert_eq!(CRC16_TABLE[128], 0x8408);
        assert_eq!(CRC16_TABLE[255], 0x0F78);
    }

    #[test]
    fn test_crc16_known_vector() {
        let crc = crc16(&[0xA5, 0x00, 0x00, 0x00, 0x01, 0x32, 0x00, 0x00]);
        assert_eq!(crc.to_le_bytes(), [0x52, 0xB9]);
    }

    #[test]
    fn test_crc16_verify() {
        let data = [0xA5, 0x00, 0x00, 0x00, 0x01, 0x32, 0x00, 0x00];
        assert!(verify_crc16(&data, [0x52, 0xB9]));
        assert!(!verify_crc16(&data, [0xB9, 0x52]));
    }

    #[test]
    fn test_crc16_empty() {
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn test_xor_sum_without_payload() {
        assert_eq!(xor_sum(&[0x01, 0x18]), (0xE6, 0xFF));
    }

    #[test]
    fn test_xor_sum_wraps() {
        let data = vec![0xFF; 300];
        let (xor, sum) = xor_sum(&data);

        // 300 is even so the 0xFF bytes cancel out
        assert_eq!(xor, 0xFF);
        let expected = (0xFFu32 * 300 + 0xFF) % 256;
        assert_eq!(sum as u32, expected);
    }

    #[test]
    fn test_xor_sum_verify() {
        let data = [0x01, 0x8F, 0x25, 0x30];
        let (xor, sum) = xor_sum(&data);

        assert!(verify_xor_sum(&data, xor, sum));
        assert!(!verify_xor_sum(&data, xor ^ 1, sum));
        assert!(!verify_xor_sum(&data, xor, sum.wrapping_add(1)));
    }
}
