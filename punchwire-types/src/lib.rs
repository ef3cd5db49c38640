//! Type definitions for punchwire

pub mod address;
pub mod error;
pub mod punch;
pub mod user;
pub mod vendor;

pub use address::DeviceAddress;
pub use error::{Error, Result};
pub use punch::{PunchLog, PunchMethod};
pub use user::{Template, UserRecord};
pub use vendor::Vendor;
