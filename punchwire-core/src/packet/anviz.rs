//! Anviz frame codec

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    checksum,
    command::{anviz_status, AnvizCommand},
    error::{Error, Result},
};

/// Anviz protocol frame
///
/// # Frame Structure
///
/// ```text
/// ┌────────┬─────────────┬─────────┬──────────┬─────────────┬─────────┬───────────┐
/// │  0xA5  │  Device ID  │ Command │ (Status) │   Length    │ Payload │  CRC-16   │
/// │ 1 byte │   4 bytes   │ 1 byte  │ (1 byte) │   2 bytes   │ N bytes │  2 bytes  │
/// │        │    (BE)     │         │ replies  │    (BE)     │         │   (LE)    │
/// └────────┴─────────────┴─────────┴──────────┴─────────────┴─────────┴───────────┘
/// ```
///
/// Replies echo the request opcode with bit `0x80` set and carry one status
/// byte before the length field. The CRC covers every byte before it.
///
/// # Examples
///
/// ```
/// use punchwire_core::command::AnvizCommand;
/// use punchwire_core::packet::anviz::Packet;
///
/// let packet = Packet::new(1, AnvizCommand::GetTime);
/// let encoded = packet.encode().unwrap();
/// assert_eq!(encoded.len(), 10);
///
/// let decoded = Packet::decode(encoded).unwrap();
/// assert_eq!(decoded.command, 0x38);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    /// Terminal number configured on the device
    pub device_id: u32,

    /// Raw opcode (with `0x80` set on replies)
    pub command: u8,

    /// Status byte, present on replies only
    pub status: Option<u8>,

    /// Command-specific data
    pub payload: Bytes,
}

impl Packet {
    /// Start-of-frame marker
    pub const MARKER: u8 = 0xA5;

    /// Header size of a request frame
    pub const REQUEST_HEADER_SIZE: usize = 8;

    /// Header size of a reply frame (one extra status byte)
    pub const REPLY_HEADER_SIZE: usize = 9;

    /// Trailing CRC size
    pub const CHECKSUM_SIZE: usize = 2;

    /// Maximum payload size the length field can describe
    pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

    /// Create a request with empty payload
    pub fn new(device_id: u32, command: AnvizCommand) -> Self {
        Self::with_payload(device_id, command, Bytes::new())
    }

    /// Create a request with payload
    pub fn with_payload(device_id: u32, command: AnvizCommand, payload: impl Into<Bytes>) -> Self {
        Self {
            device_id,
            command: command.into(),
            status: None,
            payload: payload.into(),
        }
    }

    /// Create the reply a device would send to `command`
    pub fn reply(
        device_id: u32,
        command: AnvizCommand,
        status: u8,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            device_id,
            command: command.reply_code(),
            status: Some(status),
            payload: payload.into(),
        }
    }

    /// Check whether the opcode marks a reply
    pub fn is_reply(&self) -> bool {
        is_reply_code(self.command)
    }

    /// Header size for this frame's direction
    pub fn header_size(&self) -> usize {
        header_size(self.command)
    }

    /// Get total frame size
    pub fn size(&self) -> usize {
        self.header_size() + self.payload.len() + Self::CHECKSUM_SIZE
    }

    /// Encode frame to bytes
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadTooLarge`] when the payload exceeds the 16-bit
    /// length field.
    pub fn encode(&self) -> Result<BytesMut> {
        if self.payload.len() > Self::MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                size: self.payload.len(),
                max: Self::MAX_PAYLOAD_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(self.size());

        buf.put_u8(Self::MARKER);
        buf.put_u32(self.device_id);
        buf.put_u8(self.command);
        if self.is_reply() {
            buf.put_u8(self.status.unwrap_or(anviz_status::SUCCESS));
        }
        buf.put_u16(self.payload.len() as u16);
        buf.put_slice(&self.payload);

        let crc = checksum::crc16(&buf);
        buf.put_u16_le(crc);

        Ok(buf)
    }

    /// Decode frame from bytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Buffer is shorter than header plus checksum
    /// - Marker is not `0xA5`
    /// - Declared length disagrees with the buffer
    /// - CRC verification fails
    pub fn decode(mut buf: BytesMut) -> Result<Self> {
        if buf.is_empty() {
            return Err(Error::FrameTooShort {
                expected: Self::REQUEST_HEADER_SIZE + Self::CHECKSUM_SIZE,
                actual: 0,
            });
        }

        if buf[0] != Self::MARKER {
            return Err(Error::BadMarker {
                found: hex::encode(&buf[..1]),
            });
        }

        if buf.len() < 6 {
            return Err(Error::FrameTooShort {
                expected: Self::REQUEST_HEADER_SIZE + Self::CHECKSUM_SIZE,
                actual: buf.len(),
            });
        }

        let header = header_size(buf[5]);
        let minimum = header + Self::CHECKSUM_SIZE;
        if buf.len() < minimum {
            return Err(Error::FrameTooShort {
                expected: minimum,
                actual: buf.len(),
            });
        }

        let declared = u16::from_be_bytes([buf[header - 2], buf[header - 1]]) as usize;
        let actual = buf.len() - minimum;
        if declared != actual {
            return Err(Error::LengthMismatch { declared, actual });
        }

        let body_len = buf.len() - Self::CHECKSUM_SIZE;
        let wire = [buf[body_len], buf[body_len + 1]];
        if !checksum::verify_crc16(&buf[..body_len], wire) {
            return Err(Error::ChecksumMismatch {
                expected: hex::encode(checksum::crc16(&buf[..body_len]).to_le_bytes()),
                received: hex::encode(wire),
            });
        }

        buf.advance(1);
        let device_id = buf.get_u32();
        let command = buf.get_u8();
        let status = is_reply_code(command).then(|| buf.get_u8());
        buf.advance(2);
        buf.truncate(declared);

        Ok(Self {
            device_id,
            command,
            status,
            payload: buf.freeze(),
        })
    }

    /// Size of the first complete frame in `buf`, if its header has arrived
    pub fn frame_len(buf: &[u8]) -> Option<usize> {
        if buf.first().is_some_and(|&b| b != Self::MARKER) {
            // Let the decoder report the bad marker
            return Some(buf.len());
        }
        let header = header_size(*buf.get(5)?);
        if buf.len() < header {
            return None;
        }
        let declared = u16::from_be_bytes([buf[header - 2], buf[header - 1]]) as usize;
        Some(header + declared + Self::CHECKSUM_SIZE)
    }

    /// Check that this reply answers `command` and has the expected size
    pub fn expect_echo(&self, command: AnvizCommand) -> Result<()> {
        if let Some(expected) = command.fixed_reply_len() {
            if self.size() != expected {
                return Err(Error::UnexpectedLength {
                    command: command.to_string(),
                    expected,
                    actual: self.size(),
                });
            }
        }

        if self.command != command.reply_code() {
            return Err(Error::UnexpectedReply {
                expected: command.reply_code(),
                actual: self.command,
            });
        }

        Ok(())
    }

    /// Check that the device reported success
    pub fn expect_success(&self, command: AnvizCommand) -> Result<()> {
        match self.status {
            Some(anviz_status::SUCCESS) => Ok(()),
            Some(status) => Err(Error::DeviceStatus {
                command: command.to_string(),
                status,
                status_name: anviz_status::name(status),
            }),
            None => Err(Error::UnexpectedReply {
                expected: command.reply_code(),
                actual: self.command,
            }),
        }
    }

    /// Full reply validation: size, echoed opcode and success status
    pub fn expect_reply(&self, command: AnvizCommand) -> Result<()> {
        self.expect_echo(command)?;
        self.expect_success(command)
    }
}

fn is_reply_code(command: u8) -> bool {
    command & AnvizCommand::REPLY_FLAG != 0
}

fn header_size(command: u8) -> usize {
    if is_reply_code(command) {
        Packet::REPLY_HEADER_SIZE
    } else {
        Packet::REQUEST_HEADER_SIZE
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("device_id", &self.device_id)
            .field("command", &format!("0x{:02X}", self.command))
            .field("status", &self.status.map(|s| format!("0x{:02X}", s)))
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = AnvizCommand::try_from(self.command)
            .map(|c| c.name())
            .unwrap_or("UNKNOWN");
        write!(
            f,
            "Anviz[{}](device={}, len={})",
            name,
            self.device_id,
            self.payload.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_encode_get_time_request() {
        let packet = Packet::new(1, AnvizCommand::GetTime);
        let encoded = packet.encode().unwrap();

        let body = [0xA5, 0x00, 0x00, 0x00, 0x01, 0x38, 0x00, 0x00];
        let crc = checksum::crc16(&body).to_le_bytes();
        assert_eq!(&encoded[..8], &body[..]);
        assert_eq!(&encoded[8..], &crc[..]);
    }

    #[test]
    fn test_device_id_is_big_endian() {
        let packet = Packet::new(0x0102_0304, AnvizCommand::GetTime);
        let encoded = packet.encode().unwrap();
        assert_eq!(&encoded[1..5], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_encode_known_crc() {
        // Opcode 0x32 is outside the table but the CRC is defined over raw bytes
        let packet = Packet {
            device_id: 1,
            command: 0x32,
            status: None,
            payload: Bytes::new(),
        };
        let encoded = packet.encode().unwrap();
        assert_eq!(&encoded[8..], &[0x52, 0xB9]);
    }

    #[test]
    fn test_reply_round_trip() {
        let reply = Packet::reply(7, AnvizCommand::GetTime, 0, vec![24, 3, 15, 10, 30, 5]);
        let encoded = reply.encode().unwrap();
        assert_eq!(encoded.len(), 17);

        let decoded = Packet::decode(encoded).unwrap();
        assert_eq!(decoded, reply);
        assert!(decoded.expect_reply(AnvizCommand::GetTime).is_ok());
    }

    #[test]
    fn test_expect_reply_wrong_code() {
        let reply = Packet::reply(1, AnvizCommand::SetTime, 0, Bytes::new());
        let err = reply.expect_reply(AnvizCommand::DeleteAllUsers).unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedReply {
                expected: 0xCD,
                actual: 0xB9
            }
        ));
    }

    #[test]
    fn test_expect_reply_wrong_length() {
        let reply = Packet::reply(1, AnvizCommand::SetTime, 0, vec![0]);
        let err = reply.expect_reply(AnvizCommand::SetTime).unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedLength {
                expected: 11,
                actual: 12,
                ..
            }
        ));
    }

    #[test]
    fn test_expect_reply_device_status() {
        let reply = Packet::reply(1, AnvizCommand::SetTime, anviz_status::FAIL, Bytes::new());
        let err = reply.expect_reply(AnvizCommand::SetTime).unwrap_err();
        assert!(matches!(err, Error::DeviceStatus { status: 0x01, .. }));
    }

    #[test]
    fn test_decode_bad_marker() {
        let buf = BytesMut::from(&[0xA4, 0, 0, 0, 1, 0x38, 0, 0, 0, 0][..]);
        assert!(matches!(Packet::decode(buf), Err(Error::BadMarker { .. })));
    }

    #[test]
    fn test_decode_too_short() {
        let buf = BytesMut::from(&[0xA5, 0, 0][..]);
        assert!(matches!(Packet::decode(buf), Err(Error::FrameTooShort { .. })));
    }

    #[test]
    fn test_decode_truncated_payload() {
        let packet = Packet::with_payload(1, AnvizCommand::UploadUsers, vec![1, 2, 3, 4]);
        let mut encoded = packet.encode().unwrap();
        encoded.truncate(encoded.len() - 3);
        assert!(matches!(
            Packet::decode(encoded),
            Err(Error::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_frame_len() {
        let request = Packet::with_payload(1, AnvizCommand::DownloadRecords, vec![1, 0x19])
            .encode()
            .unwrap();
        assert_eq!(Packet::frame_len(&request[..4]), None);
        assert_eq!(Packet::frame_len(&request), Some(12));

        let reply = Packet::reply(1, AnvizCommand::DownloadRecords, 0, vec![0; 20])
            .encode()
            .unwrap();
        assert_eq!(Packet::frame_len(&reply[..8]), None);
        assert_eq!(Packet::frame_len(&reply[..9]), Some(31));
        assert_eq!(Packet::frame_len(&[0x00, 0x01]), Some(2));
    }

    #[test]
    fn test_payload_too_large() {
        let packet = Packet::with_payload(1, AnvizCommand::UploadUsers, vec![0; 70_000]);
        assert!(matches!(packet.encode(), Err(Error::PayloadTooLarge { .. })));
    }

    proptest! {
        #[test]
        fn prop_request_round_trip(
            device_id in any::<u32>(),
            command in 0u8..0x80,
            payload in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let packet = Packet { device_id, command, status: None, payload: payload.into() };
            let decoded = Packet::decode(packet.encode().unwrap()).unwrap();
            prop_assert_eq!(decoded, packet);
        }

        #[test]
        fn prop_reply_round_trip(
            device_id in any::<u32>(),
            command in 0x80u8..=0xFF,
            status in any::<u8>(),
            payload in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let packet = Packet { device_id, command, status: Some(status), payload: payload.into() };
            let decoded = Packet::decode(packet.encode().unwrap()).unwrap();
            prop_assert_eq!(decoded, packet);
        }

        #[test]
        fn prop_single_byte_mutation_is_rejected(
            command in any::<u8>(),
            payload in proptest::collection::vec(any::<u8>(), 0..64),
            index in any::<prop::sample::Index>(),
            flip in 1u8..=0xFF,
        ) {
            let packet = Packet { device_id: 1, command, status: Some(0).filter(|_| command >= 0x80), payload: payload.into() };
            let mut encoded = packet.encode().unwrap();
            let at = index.index(encoded.len());
            encoded[at] ^= flip;
            prop_assert!(Packet::decode(encoded).is_err());
        }
    }
}
