//! # punchwire
//!
//! Client engine for Anviz and Soyal attendance and access-control terminals.
//!
//! ## Features
//!
//! - Both vendor wire formats: framing, CRC-16 and XOR/sum checksums
//! - Async/await API using Tokio
//! - Loss-free log drains inside one store transaction
//! - Segmented fingerprint template transfers
//! - Typed errors that tell device refusals from malformed bytes
//!
//! ## Quick Start
//!
//! ```no_run
//! use chrono::Local;
//! use punchwire::{DeviceAddress, MemoryStore, Terminal, Vendor};
//!
//! #[tokio::main]
//! async fn main() -> punchwire::Result<()> {
//!     let address = DeviceAddress::new(1, "192.168.1.218", 1621);
//!     let mut terminal = Terminal::new(Vendor::Soyal, address);
//!
//!     // Read the device clock
//!     println!("{}", terminal.get_time(&Local).await?);
//!
//!     // Move the punch log into a store
//!     let mut store = MemoryStore::new();
//!     let count = terminal.download_logs(1, &mut store, &Local).await?;
//!     println!("{} new punches", count);
//!
//!     Ok(())
//! }
//! ```

pub mod anviz;
pub mod clock;
pub mod drain;
pub mod error;
pub mod session;
pub mod soyal;
pub mod store;
pub mod terminal;

// Re-exports
pub use error::{Error, ErrorKind, Result};
pub use session::Session;
pub use store::{MemoryStore, Store};
pub use terminal::Terminal;

// Re-export types
pub use punchwire_transport::{Connector, TcpConnector, Transport};
pub use punchwire_types::{DeviceAddress, PunchLog, PunchMethod, Template, UserRecord, Vendor};
