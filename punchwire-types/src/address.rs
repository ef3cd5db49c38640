//! Device addressing

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Where a terminal lives and which terminal number it answers to
///
/// # Examples
///
/// ```
/// use punchwire_types::DeviceAddress;
///
/// let addr: DeviceAddress = "1@192.168.1.218:5010".parse().unwrap();
/// assert_eq!(addr.device_id, 1);
/// assert_eq!(addr.port, 5010);
/// assert_eq!(addr.to_string(), "1@192.168.1.218:5010");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceAddress {
    /// Terminal number configured on the device
    pub device_id: u32,

    /// Host name or IP address
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl DeviceAddress {
    pub fn new(device_id: u32, host: impl Into<String>, port: u16) -> Self {
        Self {
            device_id,
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.device_id, self.host, self.port)
    }
}

impl FromStr for DeviceAddress {
    type Err = Error;

    /// Parse `id@host:port`
    fn from_str(s: &str) -> Result<Self> {
        let (id, rest) = s
            .split_once('@')
            .ok_or_else(|| Error::Parse(format!("missing '@' in device address: {}", s)))?;
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| Error::Parse(format!("missing port in device address: {}", s)))?;

        if host.is_empty() {
            return Err(Error::Validation(format!("empty host in device address: {}", s)));
        }

        let device_id = id
            .parse()
            .map_err(|_| Error::Parse(format!("invalid device id: {}", id)))?;
        let port = port
            .parse()
            .map_err(|_| Error::Parse(format!("invalid port: {}", port)))?;

        Ok(Self::new(device_id, host, port))
    }
}
