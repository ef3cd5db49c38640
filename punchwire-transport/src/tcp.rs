//! TCP transport

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use punchwire_core::{constants, preview, FrameSizer};
use punchwire_types::DeviceAddress;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::{error::*, Connector, Transport};

/// Largest frame either terminal family can produce
const MAX_FRAME_SIZE: usize = 64 * 1024 + 16;

/// TCP transport for attendance terminals
///
/// Bytes that arrive past the end of a frame stay buffered for the next
/// `receive`.
pub struct TcpTransport {
    addr: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
    stream: Option<TcpStream>,
    pending: BytesMut,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl TcpTransport {
    /// Create new TCP transport
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            socket_addr: None,
            stream: None,
            pending: BytesMut::with_capacity(1024),
            connect_timeout: Duration::from_secs(constants::DEFAULT_TIMEOUT),
            read_timeout: Duration::from_secs(constants::DEFAULT_READ_TIMEOUT),
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set read timeout used when the caller passes `0`
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Resolve address to SocketAddr
    async fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.socket_addr {
            return Ok(addr);
        }

        let addr_str = format!("{}:{}", self.addr, self.port);

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?
            .collect();

        let addr = addrs
            .first()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))?;

        self.socket_addr = Some(*addr);
        Ok(*addr)
    }

    /// Split one complete frame off the pending buffer
    fn take_frame(&mut self, sizer: FrameSizer) -> Result<Option<BytesMut>> {
        let Some(size) = sizer(&self.pending) else {
            return Ok(None);
        };

        if size > MAX_FRAME_SIZE {
            return Err(Error::FrameTooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }

        if self.pending.len() < size {
            return Ok(None);
        }

        Ok(Some(self.pending.split_to(size)))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let addr = self.resolve_addr().await?;

        debug!("Connecting to {}...", addr);

        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(Error::Io)?;

        // Frames are small request/reply pairs
        stream.set_nodelay(true)?;

        debug!("Connected to {}", addr);

        self.pending.clear();
        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Disconnecting from {}...", self.remote_addr());

            // Graceful shutdown
            let _ = stream.shutdown().await;
        }

        self.pending.clear();
        self.socket_addr = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        trace!("Sending {} bytes: {}", data.len(), preview(data));

        stream.write_all(data).await?;
        stream.flush().await?;

        Ok(())
    }

    async fn receive(&mut self, timeout_secs: u64, sizer: FrameSizer) -> Result<BytesMut> {
        if self.stream.is_none() {
            return Err(Error::NotConnected);
        }

        let timeout_duration = if timeout_secs == 0 {
            self.read_timeout
        } else {
            Duration::from_secs(timeout_secs)
        };

        loop {
            if let Some(frame) = self.take_frame(sizer)? {
                trace!("Received {} bytes: {}", frame.len(), preview(&frame));
                return Ok(frame);
            }

            let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
            let n = timeout(timeout_duration, stream.read_buf(&mut self.pending))
                .await
                .map_err(|_| {
                    warn!("Read timeout after {:?}", timeout_duration);
                    Error::ReadTimeout
                })?
                .map_err(Error::Io)?;

            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    fn remote_addr(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("TCP transport dropped while still connected");
        }
    }
}

/// Opens a fresh [`TcpTransport`] per operation
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(constants::DEFAULT_TIMEOUT),
            read_timeout: Duration::from_secs(constants::DEFAULT_READ_TIMEOUT),
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the read timeout of opened transports
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn open(&self, address: &DeviceAddress) -> Result<Box<dyn Transport>> {
        let mut transport = TcpTransport::new(address.host.clone(), address.port)
            .with_connect_timeout(self.connect_timeout)
            .with_read_timeout(self.read_timeout);
        transport.connect().await?;
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use punchwire_core::command::AnvizCommand;
    use punchwire_core::packet::anviz::Packet;
    use punchwire_core::ANVIZ_FRAME;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_transport_create() {
        let transport = TcpTransport::new("192.168.1.218", 5010);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_tcp_transport_invalid_address() {
        let mut transport = TcpTransport::new("invalid..address", 5010)
            .with_connect_timeout(Duration::from_millis(100));

        let result = transport.connect().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_receive_not_connected() {
        let mut transport = TcpTransport::new("127.0.0.1", 5010);
        let result = transport.receive(1, ANVIZ_FRAME).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_receive_reassembles_split_and_coalesced_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let first = Packet::reply(1, AnvizCommand::SetTime, 0, Vec::new())
            .encode()
            .unwrap();
        let second = Packet::reply(1, AnvizCommand::GetTime, 0, vec![24, 1, 2, 3, 4, 5])
            .encode()
            .unwrap();

        let mut wire = first.to_vec();
        wire.extend_from_slice(&second);

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // Split the first frame, then coalesce its tail with the second
            socket.write_all(&wire[..4]).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            socket.write_all(&wire[4..]).await.unwrap();
            socket.flush().await.unwrap();
        });

        let mut transport = TcpTransport::new("127.0.0.1", port);
        transport.connect().await.unwrap();

        let a = transport.receive(2, ANVIZ_FRAME).await.unwrap();
        let b = transport.receive(2, ANVIZ_FRAME).await.unwrap();
        assert_eq!(&a[..], &first[..]);
        assert_eq!(&b[..], &second[..]);

        server.await.unwrap();
        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_receive_uses_configured_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let mut transport = TcpConnector::new()
            .with_read_timeout(Duration::from_millis(100))
            .open(&DeviceAddress::new(1, "127.0.0.1", port))
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        let result = transport.receive(0, ANVIZ_FRAME).await;
        assert!(matches!(result, Err(Error::ReadTimeout)));
        assert!(started.elapsed() < Duration::from_secs(2));

        transport.disconnect().await.unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn test_connector_opens_connected_transport() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let _ = listener.accept().await.unwrap();
        });

        let connector = TcpConnector::new();
        let mut transport = connector
            .open(&DeviceAddress::new(1, "127.0.0.1", port))
            .await
            .unwrap();
        assert!(transport.is_connected());
        transport.disconnect().await.unwrap();

        server.await.unwrap();
    }
}
