//! Scripted transport for tests
//!
//! A [`MockTransport`] plays back queued replies and records everything sent
//! to it. Clones share the same script, so a test keeps one handle for
//! assertions while the engine owns another.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::Mutex;
use punchwire_core::{preview, FrameSizer};
use punchwire_types::DeviceAddress;
use tracing::trace;

use crate::{error::*, Connector, Transport};

/// One scripted step answered by `receive`
#[derive(Debug, Clone)]
enum Step {
    /// Bytes delivered to the reader (may hold partial or several frames)
    Bytes(Vec<u8>),
    /// The read times out
    Timeout,
    /// The peer resets the connection
    Reset,
}

#[derive(Debug, Default)]
struct State {
    connected: bool,
    refuse: bool,
    script: VecDeque<Step>,
    pending: BytesMut,
    sent: Vec<Vec<u8>>,
    connects: usize,
    disconnects: usize,
    read_timeouts: Vec<u64>,
}

/// In-memory transport driven by a reply script
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for a later `receive`
    pub fn push_reply(&self, bytes: impl AsRef<[u8]>) -> &Self {
        self.state
            .lock()
            .script
            .push_back(Step::Bytes(bytes.as_ref().to_vec()));
        self
    }

    /// Queue a read timeout
    pub fn push_timeout(&self) -> &Self {
        self.state.lock().script.push_back(Step::Timeout);
        self
    }

    /// Queue a connection reset
    pub fn push_reset(&self) -> &Self {
        self.state.lock().script.push_back(Step::Reset);
        self
    }

    /// Make every following `connect` fail
    pub fn refuse_connections(&self) -> &Self {
        self.state.lock().refuse = true;
        self
    }

    /// Frames sent so far, in order
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }

    /// Number of successful connects
    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    /// Number of disconnects of an open connection
    pub fn disconnects(&self) -> usize {
        self.state.lock().disconnects
    }

    /// Timeout argument of every `receive`, in order
    pub fn read_timeouts(&self) -> Vec<u64> {
        self.state.lock().read_timeouts.clone()
    }

    /// Scripted steps not consumed yet
    pub fn remaining(&self) -> usize {
        self.state.lock().script.len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.connected {
            return Err(Error::AlreadyConnected);
        }
        if state.refuse {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        state.connected = true;
        state.connects += 1;
        state.pending.clear();
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.connected {
            state.connected = false;
            state.disconnects += 1;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(Error::NotConnected);
        }
        trace!("Mock sent {} bytes: {}", data.len(), preview(data));
        state.sent.push(data.to_vec());
        Ok(())
    }

    async fn receive(&mut self, timeout_secs: u64, sizer: FrameSizer) -> Result<BytesMut> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(Error::NotConnected);
        }
        state.read_timeouts.push(timeout_secs);

        loop {
            if let Some(size) = sizer(&state.pending) {
                if state.pending.len() >= size {
                    return Ok(state.pending.split_to(size));
                }
            }

            match state.script.pop_front() {
                Some(Step::Bytes(bytes)) => state.pending.extend_from_slice(&bytes),
                Some(Step::Reset) => {
                    state.connected = false;
                    return Err(Error::ConnectionClosed);
                }
                // An exhausted script behaves like a silent device
                Some(Step::Timeout) | None => return Err(Error::ReadTimeout),
            }
        }
    }

    fn remote_addr(&self) -> String {
        "mock".to_string()
    }
}

/// Connector handing out clones of one [`MockTransport`]
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    transport: MockTransport,
    opens: Arc<Mutex<usize>>,
}

impl MockConnector {
    pub fn new(transport: MockTransport) -> Self {
        Self {
            transport,
            opens: Arc::default(),
        }
    }

    /// Shared handle on the scripted transport
    pub fn transport(&self) -> &MockTransport {
        &self.transport
    }

    /// Number of `open` calls, successful or not
    pub fn opens(&self) -> usize {
        *self.opens.lock()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, address: &DeviceAddress) -> Result<Box<dyn Transport>> {
        *self.opens.lock() += 1;
        trace!("Mock open {}", address);

        let mut transport = self.transport.clone();
        transport.connect().await?;
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use punchwire_core::command::soyal_status;
    use punchwire_core::packet::soyal::Packet;
    use punchwire_core::SOYAL_FRAME;

    fn ack() -> Vec<u8> {
        Packet::short(1, soyal_status::ACK, Vec::new())
            .encode()
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_replays_script_in_order() {
        let mock = MockTransport::new();
        let mut both = ack();
        both.extend(ack());
        mock.push_reply(&both).push_timeout();

        let mut transport = mock.clone();
        transport.connect().await.unwrap();
        transport.send(&[0x7E]).await.unwrap();

        // Two frames delivered in one chunk come out one at a time
        assert_eq!(transport.receive(1, SOYAL_FRAME).await.unwrap().to_vec(), ack());
        assert_eq!(transport.receive(1, SOYAL_FRAME).await.unwrap().to_vec(), ack());
        assert!(matches!(
            transport.receive(1, SOYAL_FRAME).await,
            Err(Error::ReadTimeout)
        ));

        assert_eq!(mock.sent(), vec![vec![0x7E]]);
    }

    #[tokio::test]
    async fn test_split_frame_is_reassembled() {
        let mock = MockTransport::new();
        let frame = ack();
        mock.push_reply(&frame[..3]).push_reply(&frame[3..]);

        let mut transport = mock.clone();
        transport.connect().await.unwrap();
        assert_eq!(transport.receive(1, SOYAL_FRAME).await.unwrap().to_vec(), frame);
    }

    #[tokio::test]
    async fn test_reset_drops_connection() {
        let mock = MockTransport::new();
        mock.push_reset();

        let mut transport = mock.clone();
        transport.connect().await.unwrap();
        assert!(matches!(
            transport.receive(1, SOYAL_FRAME).await,
            Err(Error::ConnectionClosed)
        ));
        assert!(!mock.is_connected());
    }

    #[tokio::test]
    async fn test_connector_counts() {
        let connector = MockConnector::default();
        let address = DeviceAddress::new(1, "mock", 1621);

        let mut transport = connector.open(&address).await.unwrap();
        transport.disconnect().await.unwrap();
        transport.disconnect().await.unwrap();

        assert_eq!(connector.opens(), 1);
        assert_eq!(connector.transport().connects(), 1);
        assert_eq!(connector.transport().disconnects(), 1);
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let connector = MockConnector::default();
        connector.transport().refuse_connections();

        let result = connector.open(&DeviceAddress::new(1, "mock", 1621)).await;
        assert!(result.is_err());
        assert_eq!(connector.opens(), 1);
        assert_eq!(connector.transport().connects(), 0);
    }
}
