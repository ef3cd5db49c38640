//! Segmented template transfers
//!
//! A fingerprint record is one or two fixed-size units. Records larger than a
//! frame travel as offset-addressed segments of exactly one unit each.

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};

/// One offset-addressed piece of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Byte offset of this piece inside the whole record
    pub offset: usize,

    /// Size of the whole record
    pub total: usize,

    /// Piece contents
    pub data: Bytes,
}

/// Plan the fetches for a record the device reports as `count` units
///
/// `0` means the record is absent and yields no fetch.
pub fn plan_download(count: u16, unit: usize) -> Result<Vec<(usize, usize)>> {
    match count {
        0 => Ok(Vec::new()),
        1 => Ok(vec![(0, unit)]),
        2 => Ok(vec![(0, unit), (unit, unit)]),
        other => Err(Error::UnexpectedTemplateCount(other)),
    }
}

/// Split a record into upload segments
///
/// # Errors
///
/// Returns [`Error::InvalidTemplateLength`] unless the blob is exactly one
/// or two units long. Nothing is produced for a rejected blob, so callers can
/// validate every record before the first device write.
pub fn plan_upload(blob: &Bytes, unit: usize) -> Result<Vec<Segment>> {
    validate_len(blob.len(), unit)?;

    let total = blob.len();
    Ok((0..total / unit)
        .map(|i| Segment {
            offset: i * unit,
            total,
            data: blob.slice(i * unit..(i + 1) * unit),
        })
        .collect())
}

/// Accept only one or two whole units
pub fn validate_len(len: usize, unit: usize) -> Result<()> {
    if len == unit || len == unit * 2 {
        Ok(())
    } else {
        Err(Error::InvalidTemplateLength { len, unit })
    }
}

/// Concatenate fetched pieces in request order
///
/// Every piece must be exactly one unit long.
pub fn reassemble<I>(pieces: I, unit: usize) -> Result<Bytes>
where
    I: IntoIterator<Item = Bytes>,
{
    let mut out = BytesMut::new();

    for piece in pieces {
        if piece.len() != unit {
            return Err(Error::UnexpectedLength {
                command: "template segment".to_string(),
                expected: unit,
                actual: piece.len(),
            });
        }
        out.extend_from_slice(&piece);
    }

    Ok(out.freeze())
}
