//! Soyal frame codec

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    checksum,
    command::{soyal_status, ReplyKind, Shape, SoyalCommand},
    error::{Error, Result},
};

/// Soyal protocol frame
///
/// # Frame Structure
///
/// ```text
/// Short:
/// ┌──────┬────────┬──────┬─────────┬─────────┬─────┬─────┐
/// │ 0x7E │ Length │ Dest │ Command │ Payload │ XOR │ SUM │
/// └──────┴────────┴──────┴─────────┴─────────┴─────┴─────┘
///
/// Extended:
/// ┌─────────────┬──────────────┬──────┬─────────┬─────────┬─────┬─────┐
/// │ FF 00 5A A5 │ Length (BE)  │ Dest │ Command │ Payload │ XOR │ SUM │
/// └─────────────┴──────────────┴──────┴─────────┴─────────┴─────┴─────┘
/// ```
///
/// `Length` counts destination, command, payload and both trailer bytes,
/// i.e. `4 + payload.len()`. On replies the command position carries the
/// ACK/NACK or event code.
///
/// # Examples
///
/// ```
/// use punchwire_core::packet::soyal::Packet;
///
/// let encoded = Packet::short(0x01, 0x18, Vec::new()).encode().unwrap();
/// assert_eq!(&encoded[..], &[0x7E, 0x04, 0x01, 0x18, 0xE6, 0xFF]);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    /// Frame shape
    pub shape: Shape,

    /// Destination node id
    pub destination: u8,

    /// Function code on requests, reply or event code on replies
    pub command: u8,

    /// Command-specific data
    pub payload: Bytes,
}

impl Packet {
    /// Marker of a short frame
    pub const SHORT_MARKER: u8 = 0x7E;

    /// Marker of an extended frame
    pub const EXTENDED_MARKER: [u8; 4] = [0xFF, 0x00, 0x5A, 0xA5];

    /// Destination, command and both trailer bytes
    pub const LENGTH_OVERHEAD: usize = 4;

    /// Build a short frame
    pub fn short(destination: u8, command: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            shape: Shape::Short,
            destination,
            command,
            payload: payload.into(),
        }
    }

    /// Build an extended frame
    pub fn extended(destination: u8, command: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            shape: Shape::Extended,
            destination,
            command,
            payload: payload.into(),
        }
    }

    /// Build a request in the shape its command travels in
    pub fn request(destination: u8, command: SoyalCommand, payload: impl Into<Bytes>) -> Self {
        Self {
            shape: command.shape(),
            destination,
            command: command.into(),
            payload: payload.into(),
        }
    }

    /// Marker and length bytes before the destination
    pub fn prefix_size(shape: Shape) -> usize {
        match shape {
            Shape::Short => 2,
            Shape::Extended => 6,
        }
    }

    /// Largest payload the length field of `shape` can describe
    pub fn max_payload(shape: Shape) -> usize {
        match shape {
            Shape::Short => u8::MAX as usize - Self::LENGTH_OVERHEAD,
            Shape::Extended => u16::MAX as usize - Self::LENGTH_OVERHEAD,
        }
    }

    /// Get total frame size
    pub fn size(&self) -> usize {
        Self::prefix_size(self.shape) + Self::LENGTH_OVERHEAD + self.payload.len()
    }

    /// Encode frame to bytes
    pub fn encode(&self) -> Result<BytesMut> {
        let max = Self::max_payload(self.shape);
        if self.payload.len() > max {
            return Err(Error::PayloadTooLarge {
                size: self.payload.len(),
                max,
            });
        }

        let length = Self::LENGTH_OVERHEAD + self.payload.len();
        let mut buf = BytesMut::with_capacity(self.size());

        match self.shape {
            Shape::Short => {
                buf.put_u8(Self::SHORT_MARKER);
                buf.put_u8(length as u8);
            }
            Shape::Extended => {
                buf.put_slice(&Self::EXTENDED_MARKER);
                buf.put_u16(length as u16);
            }
        }

        let body_start = buf.len();
        buf.put_u8(self.destination);
        buf.put_u8(self.command);
        buf.put_slice(&self.payload);

        let (xor, sum) = checksum::xor_sum(&buf[body_start..]);
        buf.put_u8(xor);
        buf.put_u8(sum);

        Ok(buf)
    }

    /// Decode frame from bytes, detecting the shape from the first byte
    ///
    /// # Errors
    ///
    /// Returns an error if the marker is unknown, the buffer is truncated,
    /// the declared length disagrees with the buffer or either trailer byte
    /// does not match.
    pub fn decode(buf: BytesMut) -> Result<Self> {
        let shape = detect_shape(&buf)?;
        let prefix = Self::prefix_size(shape);
        let minimum = prefix + Self::LENGTH_OVERHEAD;

        if buf.len() < minimum {
            return Err(Error::FrameTooShort {
                expected: minimum,
                actual: buf.len(),
            });
        }

        let declared = declared_length(&buf, shape);
        let actual = buf.len() - prefix;
        if declared != actual {
            return Err(Error::LengthMismatch { declared, actual });
        }

        let trailer = buf.len() - 2;
        let (xor, sum) = (buf[trailer], buf[trailer + 1]);
        if !checksum::verify_xor_sum(&buf[prefix..trailer], xor, sum) {
            let (exp_xor, exp_sum) = checksum::xor_sum(&buf[prefix..trailer]);
            return Err(Error::ChecksumMismatch {
                expected: hex::encode([exp_xor, exp_sum]),
                received: hex::encode([xor, sum]),
            });
        }

        let mut buf = buf;
        let destination = buf[prefix];
        let command = buf[prefix + 1];
        let mut body = buf.split_off(prefix + 2);
        body.truncate(body.len() - 2);

        Ok(Self {
            shape,
            destination,
            command,
            payload: body.freeze(),
        })
    }

    /// Size of the first complete frame in `buf`, if its header has arrived
    pub fn frame_len(buf: &[u8]) -> Option<usize> {
        let shape = match detect_shape(buf) {
            Ok(shape) => shape,
            Err(Error::FrameTooShort { .. }) => return None,
            Err(_) => return Some(buf.len()),
        };
        let prefix = Self::prefix_size(shape);
        if buf.len() < prefix {
            return None;
        }
        Some(prefix + declared_length(buf, shape))
    }

    /// Data byte at `index`, counted from the first byte after the command
    pub fn data_byte(&self, index: usize) -> Option<u8> {
        self.payload.get(index).copied()
    }

    pub fn is_ack(&self) -> bool {
        self.command == soyal_status::ACK
    }

    pub fn is_nack(&self) -> bool {
        self.command == soyal_status::NACK
    }

    /// Judge a reply to `command`
    ///
    /// `Ack` replies proceed only on an explicit ACK; `Data` replies fail
    /// only on an explicit NACK.
    pub fn expect(&self, command: SoyalCommand, kind: ReplyKind) -> Result<()> {
        let accepted = match kind {
            ReplyKind::Ack => self.is_ack(),
            ReplyKind::Data => !self.is_nack(),
        };

        if accepted {
            Ok(())
        } else {
            Err(Error::DeviceStatus {
                command: command.to_string(),
                status: self.command,
                status_name: soyal_status::name(self.command),
            })
        }
    }
}

fn detect_shape(buf: &[u8]) -> Result<Shape> {
    match buf.first() {
        None => Err(Error::FrameTooShort {
            expected: 1,
            actual: 0,
        }),
        Some(&Packet::SHORT_MARKER) => Ok(Shape::Short),
        Some(&0xFF) => {
            let available = buf.len().min(Packet::EXTENDED_MARKER.len());
            if buf[..available] != Packet::EXTENDED_MARKER[..available] {
                return Err(Error::BadMarker {
                    found: hex::encode(&buf[..available]),
                });
            }
            if available < Packet::EXTENDED_MARKER.len() {
                return Err(Error::FrameTooShort {
                    expected: Packet::EXTENDED_MARKER.len(),
                    actual: available,
                });
            }
            Ok(Shape::Extended)
        }
        Some(&other) => Err(Error::BadMarker {
            found: format!("{:02x}", other),
        }),
    }
}

fn declared_length(buf: &[u8], shape: Shape) -> usize {
    match shape {
        Shape::Short => buf[1] as usize,
        Shape::Extended => u16::from_be_bytes([buf[4], buf[5]]) as usize,
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("shape", &self.shape)
            .field("destination", &self.destination)
            .field("command", &format!("0x{:02X}", self.command))
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Soyal[0x{:02X}](dest={}, {:?}, len={})",
            self.command,
            self.destination,
            self.shape,
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
    fn test_encode_short_without_payload() {
        let encoded = Packet::short(0x01, 0x18, Bytes::new()).encode().unwrap();
        assert_eq!(&encoded[..], &[0x7E, 0x04, 0x01, 0x18, 0xE6, 0xFF]);
    }

    #[test]
    fn test_encode_extended_without_payload() {
        let encoded = Packet::extended(0x01, 0x18, Bytes::new()).encode().unwrap();
        assert_eq!(
            &encoded[..],
            &[0xFF, 0x00, 0x5A, 0xA5, 0x00, 0x04, 0x01, 0x18, 0xE6, 0xFF]
        );
    }

    #[test]
    fn test_request_picks_shape() {
        let get_time = Packet::request(1, SoyalCommand::GetTime, Bytes::new());
        assert_eq!(get_time.shape, Shape::Short);

        let log = Packet::request(1, SoyalCommand::ReadOldestLog, Bytes::new());
        assert_eq!(log.shape, Shape::Extended);
    }

    #[test]
    fn test_decode_reports_command_and_payload() {
        let frame = Packet::extended(0x01, 0x27, vec![0x00, 0x10, 0x20]);
        let decoded = Packet::decode(frame.encode().unwrap()).unwrap();

        assert_eq!(decoded.shape, Shape::Extended);
        assert_eq!(decoded.command, 0x27);
        assert_eq!(decoded.data_byte(1), Some(0x10));
        assert_eq!(decoded.data_byte(3), None);
    }

    #[test]
    fn test_decode_checksum_mismatch() {
        let mut encoded = Packet::short(1, soyal_status::ACK, Bytes::new())
            .encode()
            .unwrap();
        let last = encoded.len() - 1;
        encoded[last] ^= 0x01;

        assert!(matches!(
            Packet::decode(encoded),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_bad_marker() {
        let buf = BytesMut::from(&[0x7F, 0x04, 0x01, 0x04, 0x00, 0x00][..]);
        assert!(matches!(Packet::decode(buf), Err(Error::BadMarker { .. })));

        let buf = BytesMut::from(&[0xFF, 0x01, 0x5A, 0xA5, 0x00, 0x04, 0x01, 0x04, 0, 0][..]);
        assert!(matches!(Packet::decode(buf), Err(Error::BadMarker { .. })));
    }

    #[test]
    fn test_expect_ack_and_nack() {
        let ack = Packet::short(1, soyal_status::ACK, Bytes::new());
        let nack = Packet::short(1, soyal_status::NACK, Bytes::new());
        let data = Packet::short(1, 0x0B, vec![1, 2, 3]);

        assert!(ack.expect(SoyalCommand::SetTime, ReplyKind::Ack).is_ok());
        assert!(nack.expect(SoyalCommand::SetTime, ReplyKind::Ack).is_err());
        assert!(data.expect(SoyalCommand::SetTime, ReplyKind::Ack).is_err());

        assert!(data.expect(SoyalCommand::GetTime, ReplyKind::Data).is_ok());
        assert!(matches!(
            nack.expect(SoyalCommand::GetTime, ReplyKind::Data),
            Err(Error::DeviceStatus { status: 0x05, .. })
        ));
    }

    #[test]
    fn test_frame_len() {
        let short = Packet::short(1, 0x24, Bytes::new()).encode().unwrap();
        assert_eq!(Packet::frame_len(&short[..1]), None);
        assert_eq!(Packet::frame_len(&short[..2]), Some(6));

        let extended = Packet::extended(1, 0x8F, vec![0; 384]).encode().unwrap();
        assert_eq!(Packet::frame_len(&extended[..3]), None);
        assert_eq!(Packet::frame_len(&extended[..6]), Some(extended.len()));

        assert_eq!(Packet::frame_len(&[0x10, 0x20, 0x30]), Some(3));
    }

    #[test]
    fn test_short_payload_limit() {
        let packet = Packet::short(1, 0x23, vec![0; 252]);
        assert!(matches!(packet.encode(), Err(Error::PayloadTooLarge { max: 251, .. })));
        assert!(Packet::extended(1, 0x8F, vec![0; 800]).encode().is_ok());
    }

    fn shape_strategy() -> impl Strategy<Value = Shape> {
        prop_oneof![Just(Shape::Short), Just(Shape::Extended)]
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            shape in shape_strategy(),
            destination in any::<u8>(),
            command in any::<u8>(),
            payload in proptest::collection::vec(any::<u8>(), 0..=251),
        ) {
            let packet = Packet { shape, destination, command, payload: payload.into() };
            let decoded = Packet::decode(packet.encode().unwrap()).unwrap();
            prop_assert_eq!(decoded, packet);
        }

        #[test]
        fn prop_single_byte_mutation_is_rejected(
            shape in shape_strategy(),
            command in any::<u8>(),
            payload in proptest::collection::vec(any::<u8>(), 0..64),
            index in any::<prop::sample::Index>(),
            flip in 1u8..=0xFF,
        ) {
            let packet = Packet { shape, destination: 1, command, payload: payload.into() };
            let mut encoded = packet.encode().unwrap();
            let at = index.index(encoded.len());
            encoded[at] ^= flip;
            prop_assert!(Packet::decode(encoded).is_err());
        }
    }
}
