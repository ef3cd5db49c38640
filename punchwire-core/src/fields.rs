//! Fixed-width field helpers
//!
//! Terminal records pack integers into 2, 3, 4 or 5 big-endian bytes. A field
//! filled with `0xFF` means "not set" and never carries a literal value.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

/// Filler byte of an unset field
pub const ABSENT: u8 = 0xFF;

/// Largest number of digits the credential nibble can describe
pub const MAX_CREDENTIAL_DIGITS: usize = 15;

/// Credential values share their first byte with the digit count
pub const MAX_CREDENTIAL_VALUE: u32 = 0x0F_FFFF;

/// Card codes are 24 bits; all ones is reserved for "absent"
pub const MAX_CARD_VALUE: u32 = 0xFF_FFFE;

/// Read an unsigned big-endian integer spanning the whole slice (1 to 8 bytes)
pub fn read_be(buf: &[u8]) -> u64 {
    BigEndian::read_uint(buf, buf.len())
}

/// Write `value` big-endian into the whole of `out` (1 to 8 bytes)
pub fn write_be(value: u64, out: &mut [u8]) -> Result<()> {
    let width = out.len();
    if width < 8 && value >> (width * 8) != 0 {
        return Err(Error::FieldOverflow { value, width });
    }
    BigEndian::write_uint(out, value, width);
    Ok(())
}

/// Encode `value` into `N` big-endian bytes
pub fn be_bytes<const N: usize>(value: u64) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    write_be(value, &mut out)?;
    Ok(out)
}

/// Check whether a field is entirely `0xFF`
pub fn is_absent(field: &[u8]) -> bool {
    field.iter().all(|&b| b == ABSENT)
}

/// Pack a numeric credential into three bytes
///
/// The high nibble of the first byte carries the number of digits so that
/// leading zeros survive the round trip; the remaining 20 bits carry the value.
///
/// # Examples
///
/// ```
/// use punchwire_core::fields;
///
/// assert_eq!(fields::pack_credential("0123").unwrap(), [0x40, 0x00, 0x7B]);
/// ```
pub fn pack_credential(credential: &str) -> Result<[u8; 3]> {
    if credential.is_empty()
        || credential.len() > MAX_CREDENTIAL_DIGITS
        || !credential.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(Error::InvalidCredential(credential.to_string()));
    }

    let value: u32 = credential
        .parse()
        .map_err(|_| Error::InvalidCredential(credential.to_string()))?;
    if value > MAX_CREDENTIAL_VALUE {
        return Err(Error::InvalidCredential(credential.to_string()));
    }

    let mut out: [u8; 3] = be_bytes(value as u64)?;
    out[0] |= (credential.len() as u8) << 4;
    Ok(out)
}

/// Unpack a three-byte credential, `None` when the field is unset
pub fn unpack_credential(field: [u8; 3]) -> Option<String> {
    if is_absent(&field) {
        return None;
    }

    let digits = (field[0] >> 4) as usize;
    let value = read_be(&[field[0] & 0x0F, field[1], field[2]]);

    Some(format!("{:0digits$}", value))
}

/// Pack a decimal card code into three bytes
pub fn pack_card(card: &str) -> Result<[u8; 3]> {
    let value: u32 = card
        .trim()
        .parse()
        .map_err(|_| Error::InvalidCard(card.to_string()))?;
    if value > MAX_CARD_VALUE {
        return Err(Error::InvalidCard(card.to_string()));
    }
    be_bytes(value as u64)
}

/// Unpack a three-byte card code, `None` when the field is unset
pub fn unpack_card(field: [u8; 3]) -> Option<String> {
    if is_absent(&field) {
        return None;
    }
    Some(read_be(&field).to_string())
}
