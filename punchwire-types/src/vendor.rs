//! Terminal families

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Terminal family, also used to key stored biometric data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vendor {
    Anviz,
    Soyal,
}

impl Vendor {
    pub fn name(self) -> &'static str {
        match self {
            Self::Anviz => "anviz",
            Self::Soyal => "soyal",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Vendor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "anviz" => Ok(Self::Anviz),
            "soyal" => Ok(Self::Soyal),
            _ => Err(Error::Parse(format!("unknown vendor: {}", s))),
        }
    }
}
