//! Opcode tables for both terminal families

use std::fmt;

use crate::error::{Error, Result};

/// Anviz request opcodes
///
/// The device echoes every request with the same opcode OR `0x80`
/// (see [`AnvizCommand::reply_code`]).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AnvizCommand {
    GetTime = 0x38,
    SetTime = 0x39,
    DownloadRecords = 0x40,
    DownloadUsers = 0x42,
    UploadUsers = 0x43,
    DownloadTemplate = 0x44,
    UploadTemplate = 0x45,
    DeleteAllUsers = 0x4D,
    ClearRecords = 0x4E,
}

impl AnvizCommand {
    /// Bit set by the device on the echoed opcode
    pub const REPLY_FLAG: u8 = 0x80;

    /// Opcode the device answers with
    pub fn reply_code(self) -> u8 {
        self as u8 | Self::REPLY_FLAG
    }

    /// Exact reply size, for commands whose reply has a fixed shape
    pub fn fixed_reply_len(self) -> Option<usize> {
        match self {
            Self::GetTime => Some(17),
            Self::SetTime | Self::DeleteAllUsers => Some(11),
            _ => None,
        }
    }

    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::GetTime => "GET_DATETIME",
            Self::SetTime => "SET_DATETIME",
            Self::DownloadRecords => "DOWNLOAD_RECORDS",
            Self::DownloadUsers => "DOWNLOAD_STAFF_INFO",
            Self::UploadUsers => "UPLOAD_STAFF_INFO",
            Self::DownloadTemplate => "DOWNLOAD_FP_TEMPLATE",
            Self::UploadTemplate => "UPLOAD_FP_TEMPLATE",
            Self::DeleteAllUsers => "CLEAR_ALL_STAFF",
            Self::ClearRecords => "CLEAR_RECORDS",
        }
    }
}

impl From<AnvizCommand> for u8 {
    fn from(cmd: AnvizCommand) -> u8 {
        cmd as u8
    }
}

impl TryFrom<u8> for AnvizCommand {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value & !Self::REPLY_FLAG {
            0x38 => Ok(Self::GetTime),
            0x39 => Ok(Self::SetTime),
            0x40 => Ok(Self::DownloadRecords),
            0x42 => Ok(Self::DownloadUsers),
            0x43 => Ok(Self::UploadUsers),
            0x44 => Ok(Self::DownloadTemplate),
            0x45 => Ok(Self::UploadTemplate),
            0x4D => Ok(Self::DeleteAllUsers),
            0x4E => Ok(Self::ClearRecords),
            _ => Err(Error::UnknownCommand(value)),
        }
    }
}

impl fmt::Display for AnvizCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}

/// Anviz reply status codes
pub mod anviz_status {
    pub const SUCCESS: u8 = 0x00;
    pub const FAIL: u8 = 0x01;
    pub const FULL: u8 = 0x04;
    pub const EMPTY: u8 = 0x05;
    pub const NO_USER: u8 = 0x06;
    pub const TIME_OUT: u8 = 0x08;
    pub const USER_OCCUPIED: u8 = 0x0A;
    pub const FINGER_OCCUPIED: u8 = 0x0B;

    /// Human readable name of a status byte
    pub fn name(status: u8) -> &'static str {
        match status {
            SUCCESS => "ACK_SUCCESS",
            FAIL => "ACK_FAIL",
            FULL => "ACK_FULL",
            EMPTY => "ACK_EMPTY",
            NO_USER => "ACK_NO_USER",
            TIME_OUT => "ACK_TIME_OUT",
            USER_OCCUPIED => "ACK_USER_OCCUPIED",
            FINGER_OCCUPIED => "ACK_FINGER_OCCUPIED",
            _ => "ACK_UNKNOWN",
        }
    }
}

/// Soyal function codes
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SoyalCommand {
    SetTime = 0x23,
    GetTime = 0x24,
    ReadOldestLog = 0x25,
    DeleteOldestLog = 0x37,
    Fingerprint = 0x8F,
}

/// How a Soyal reply to a given command has to be judged
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReplyKind {
    /// Only an explicit ACK proceeds
    Ack,
    /// The reply carries data; only an explicit NACK fails
    Data,
}

/// Frame shape a Soyal command travels in
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Shape {
    /// `7E` marker, one length byte
    Short,
    /// `FF 00 5A A5` marker, two length bytes
    Extended,
}

impl SoyalCommand {
    pub fn shape(self) -> Shape {
        match self {
            Self::SetTime | Self::GetTime => Shape::Short,
            Self::ReadOldestLog | Self::DeleteOldestLog | Self::Fingerprint => Shape::Extended,
        }
    }

    /// Reply expected for a request carrying `payload`
    ///
    /// Fingerprint requests are judged by their sub-command byte.
    pub fn reply_kind(self, payload: &[u8]) -> ReplyKind {
        match self {
            Self::SetTime | Self::DeleteOldestLog => ReplyKind::Ack,
            Self::GetTime | Self::ReadOldestLog => ReplyKind::Data,
            Self::Fingerprint => match payload.first() {
                Some(&op) => fingerprint_op::reply_kind(op),
                None => ReplyKind::Ack,
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::SetTime => "SET_CLOCK",
            Self::GetTime => "GET_CLOCK",
            Self::ReadOldestLog => "READ_OLDEST_EVENT",
            Self::DeleteOldestLog => "REMOVE_OLDEST_EVENT",
            Self::Fingerprint => "FINGERPRINT",
        }
    }
}

impl From<SoyalCommand> for u8 {
    fn from(cmd: SoyalCommand) -> u8 {
        cmd as u8
    }
}

impl TryFrom<u8> for SoyalCommand {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x23 => Ok(Self::SetTime),
            0x24 => Ok(Self::GetTime),
            0x25 => Ok(Self::ReadOldestLog),
            0x37 => Ok(Self::DeleteOldestLog),
            0x8F => Ok(Self::Fingerprint),
            _ => Err(Error::UnknownCommand(value)),
        }
    }
}

impl fmt::Display for SoyalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}

/// Sub-commands carried as the first payload byte of [`SoyalCommand::Fingerprint`]
pub mod fingerprint_op {
    use super::ReplyKind;

    pub const COUNT: u8 = 0x21;
    pub const DELETE_RANGE: u8 = 0x22;
    pub const READ: u8 = 0x23;
    pub const WRITE: u8 = 0x24;
    pub const SUBSYSTEM: u8 = 0x25;

    /// Argument of [`SUBSYSTEM`] that suspends fingerprint matching
    pub const PAUSE: u8 = 0x30;

    /// Argument of [`SUBSYSTEM`] that resumes fingerprint matching
    pub const RESUME: u8 = 0x31;

    /// Probes and reads answer with data, everything else with an ACK
    pub fn reply_kind(op: u8) -> ReplyKind {
        match op {
            COUNT | READ => ReplyKind::Data,
            _ => ReplyKind::Ack,
        }
    }
}

/// Soyal reply codes found at the function-code position
pub mod soyal_status {
    pub const ACK: u8 = 0x04;
    pub const NACK: u8 = 0x05;

    pub const EVENT_CARD_OK: u8 = 11;
    pub const EVENT_FINGERPRINT_OK: u8 = 39;
    pub const EVENT_FINGERPRINT_IDENTIFY_FAILED: u8 = 40;
    pub const EVENT_FINGERPRINT_DENIED: u8 = 56;

    pub fn name(code: u8) -> &'static str {
        match code {
            ACK => "ACK",
            NACK => "NACK",
            EVENT_CARD_OK => "EVENT_CARD_OK",
            EVENT_FINGERPRINT_OK => "EVENT_FINGERPRINT_OK",
            EVENT_FINGERPRINT_IDENTIFY_FAILED => "EVENT_FINGERPRINT_IDENTIFY_FAILED",
            EVENT_FINGERPRINT_DENIED => "EVENT_FINGERPRINT_DENIED",
            _ => "EVENT_OTHER",
        }
    }
}
