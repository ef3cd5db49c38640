//! Attendance punches

use std::fmt;

use chrono::{DateTime, FixedOffset};

/// How the user identified at the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PunchMethod {
    #[default]
    None = 0,
    Fingerprint = 1,
    Pin = 2,
    Card = 3,
}

impl fmt::Display for PunchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Fingerprint => "fingerprint",
            Self::Pin => "pin",
            Self::Card => "card",
        };
        f.write_str(name)
    }
}

/// One attendance record drained from a terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PunchLog {
    pub user_id: u64,

    /// Local time of the punch, in the zone the drain ran with
    pub timestamp: DateTime<FixedOffset>,

    pub method: PunchMethod,

    pub work_code: u32,

    /// `false` when the terminal reported a code this library does not map
    pub valid: bool,

    /// Store row id of the terminal the record came from
    pub terminal: i64,

    /// Raw event code, for terminals that report one
    pub event: Option<u8>,
}
