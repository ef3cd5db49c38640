//! Frame codecs for both terminal families
//!
//! Both codecs share the same shape of API: `encode`, `decode` and a
//! `frame_len` sizer that tells a byte-stream transport where one frame ends.

pub mod anviz;
pub mod soyal;

/// Reports the size of the first complete frame in a buffer
///
/// Returns `None` while the header has not fully arrived. Once a sizer
/// returns `Some(n)`, the transport waits for `n` bytes and hands them to the
/// decoder as a single frame.
pub type FrameSizer = fn(&[u8]) -> Option<usize>;

/// Sizer for Anviz frames
pub const ANVIZ_FRAME: FrameSizer = anviz::Packet::frame_len;

/// Sizer for Soyal frames (short and extended)
pub const SOYAL_FRAME: FrameSizer = soyal::Packet::frame_len;

/// Short hex preview of a frame for trace logs
pub fn preview(frame: &[u8]) -> String {
    const PREVIEW_LEN: usize = 32;

    if frame.len() > PREVIEW_LEN {
        format!("{}..", hex::encode(&frame[..PREVIEW_LEN]))
    } else {
        hex::encode(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview(&[0xA5, 0x01]), "a501");
        assert!(preview(&[0u8; 64]).ends_with(".."));
        assert_eq!(preview(&[0u8; 64]).len(), 66);
    }
}
