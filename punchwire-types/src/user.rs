//! Enrolled users and their fingerprint templates

use bytes::Bytes;

/// A user as known to a terminal
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserRecord {
    /// Employee number, also the id enrolled on the terminal
    pub user_id: u64,

    /// Numeric keypad credential, leading zeros significant
    pub credential: Option<String>,

    /// Card code in decimal
    pub card: Option<String>,
}

impl UserRecord {
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_card(mut self, card: impl Into<String>) -> Self {
        self.card = Some(card.into());
        self
    }
}

/// Opaque fingerprint template keyed by `(user_id, slot)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub user_id: u64,

    /// Finger slot (backup code) on the terminal
    pub slot: u8,

    pub data: Bytes,
}

impl Template {
    pub fn new(user_id: u64, slot: u8, data: impl Into<Bytes>) -> Self {
        Self {
            user_id,
            slot,
            data: data.into(),
        }
    }
}
