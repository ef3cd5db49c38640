//! Transport layer for punchwire
//!
//! Provides the byte-stream abstraction the protocol engine talks through,
//! a TCP implementation and a scripted mock for tests.

pub mod error;
pub mod mock;
pub mod tcp;

pub use error::{Error, Result};
pub use mock::{MockConnector, MockTransport};
pub use tcp::{TcpConnector, TcpTransport};

use async_trait::async_trait;
use bytes::BytesMut;
use punchwire_core::FrameSizer;
use punchwire_types::DeviceAddress;

/// Ordered byte stream to one terminal
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to device
    async fn connect(&mut self) -> Result<()>;

    /// Disconnect from device
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Send raw bytes
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive exactly one frame, as delimited by `sizer` (with timeout)
    async fn receive(&mut self, timeout_secs: u64, sizer: FrameSizer) -> Result<BytesMut>;

    /// Get remote address
    fn remote_addr(&self) -> String;
}

/// Opens connections for operations that were not handed one
#[async_trait]
pub trait Connector: Send + Sync {
    /// Return a connected transport to `address`
    async fn open(&self, address: &DeviceAddress) -> Result<Box<dyn Transport>>;
}
