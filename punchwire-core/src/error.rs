//! Error types for punchwire-core

/// Result type alias for punchwire-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad class of a failure, independent of the layer that raised it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed bytes: marker, length or checksum
    Protocol,
    /// The device answered with an explicit failure status
    DeviceStatus,
    /// Input rejected before anything was sent
    Validation,
    /// Connection refused, reset or timed out
    Transport,
    /// Persistence store failure
    Store,
    /// Operation not available for this terminal family
    Unsupported,
}

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Frame is too short to be valid
    #[error("Frame too short: expected at least {expected} bytes, got {actual} bytes")]
    FrameTooShort { expected: usize, actual: usize },

    /// Start-of-frame marker not recognised
    #[error("Bad frame marker: {found}")]
    BadMarker { found: String },

    /// Declared length disagrees with the received bytes
    #[error("Length mismatch: header declares {declared} bytes, frame carries {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },

    /// Checksum verification failed
    #[error("Checksum mismatch: expected {expected}, received {received}")]
    ChecksumMismatch { expected: String, received: String },

    /// Reply has the wrong total size for its command
    #[error("Unexpected reply length for {command}: expected {expected} bytes, got {actual} bytes")]
    UnexpectedLength {
        command: String,
        expected: usize,
        actual: usize,
    },

    /// Device echoed another opcode than the one requested
    #[error("Unexpected reply code: expected 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedReply { expected: u8, actual: u8 },

    /// Template probe answered with a count other than 0, 1 or 2
    #[error("Unexpected template count: {0}")]
    UnexpectedTemplateCount(u16),

    /// Unknown command code
    #[error("Unknown command code: 0x{0:02X}")]
    UnknownCommand(u8),

    /// Payload does not fit the length field of the frame shape
    #[error("Payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge { size: usize, max: usize },

    /// Device refused the command
    #[error("Device returned {status_name}(0x{status:02X}) for {command}")]
    DeviceStatus {
        command: String,
        status: u8,
        status_name: &'static str,
    },

    /// Template blob is not one or two units long
    #[error("Invalid template length: {len} bytes (expected one or two units of {unit} bytes)")]
    InvalidTemplateLength { len: usize, unit: usize },

    /// Credential is not a short decimal number
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// Card code is not a decimal number that fits 24 bits
    #[error("Invalid card code: {0}")]
    InvalidCard(String),

    /// Numeric value exceeds its wire width
    #[error("Value {value} does not fit in {width} bytes")]
    FieldOverflow { value: u64, width: usize },
}

impl Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceStatus { .. } => ErrorKind::DeviceStatus,
            Self::InvalidTemplateLength { .. }
            | Self::InvalidCredential(_)
            | Self::InvalidCard(_)
            | Self::FieldOverflow { .. }
            | Self::PayloadTooLarge { .. } => ErrorKind::Validation,
            _ => ErrorKind::Protocol,
        }
    }

    /// Check if error is recoverable (retry might succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::DeviceStatus)
    }
}
