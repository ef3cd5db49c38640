//! Connection lifecycle of one high-level operation

use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, trace, warn};

use punchwire_core::{preview, FrameSizer};
use punchwire_transport::{Connector, Transport};
use punchwire_types::DeviceAddress;

use crate::error::Result;

enum Link<'a> {
    /// Opened for this operation, closed by [`Session::finish`]
    Transient(Box<dyn Transport>),
    /// Supplied by the caller, never opened or closed here
    Attached(&'a mut dyn Transport),
}

/// Request/response exchanges against one terminal
///
/// A session lives for exactly one operation. Exchanges are strictly
/// sequential: each one writes a frame and awaits exactly one reply frame.
pub struct Session<'a> {
    link: Link<'a>,
    device_id: u32,
    /// Reply timeout; `None` defers to the transport's own read timeout
    timeout: Option<Duration>,
    sizer: FrameSizer,
}

impl<'a> Session<'a> {
    /// Open a transient connection through `connector`
    pub async fn open(
        connector: &dyn Connector,
        address: &DeviceAddress,
        timeout: Option<Duration>,
        sizer: FrameSizer,
    ) -> Result<Self> {
        debug!("Opening connection to {}", address);
        let transport = connector.open(address).await?;

        Ok(Self {
            link: Link::Transient(transport),
            device_id: address.device_id,
            timeout,
            sizer,
        })
    }

    /// Run over a connection the caller keeps ownership of
    pub fn attach(
        transport: &'a mut dyn Transport,
        device_id: u32,
        timeout: Option<Duration>,
        sizer: FrameSizer,
    ) -> Self {
        Self {
            link: Link::Attached(transport),
            device_id,
            timeout,
            sizer,
        }
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    /// Whether the connection was opened by this session
    #[cfg(test)]
    fn is_transient(&self) -> bool {
        matches!(self.link, Link::Transient(_))
    }

    fn transport(&mut self) -> &mut dyn Transport {
        match &mut self.link {
            Link::Transient(transport) => transport.as_mut(),
            Link::Attached(transport) => &mut **transport,
        }
    }

    /// Send one frame and wait for exactly one reply frame
    pub async fn exchange(&mut self, frame: &[u8]) -> Result<BytesMut> {
        let timeout_secs = self.timeout.map_or(0, |t| t.as_secs().max(1));
        let sizer = self.sizer;
        let transport = self.transport();

        trace!("Sent {} bytes: {}", frame.len(), preview(frame));
        transport.send(frame).await?;

        let reply = transport.receive(timeout_secs, sizer).await?;
        trace!("Received {} bytes: {}", reply.len(), preview(&reply));
        Ok(reply)
    }

    /// End the operation, closing a transient connection
    ///
    /// Runs on success and failure alike. A failing close is logged and never
    /// replaces `result`.
    pub async fn finish<T>(mut self, result: Result<T>) -> Result<T> {
        if let Link::Transient(transport) = &mut self.link {
            let remote = transport.remote_addr();
            match transport.disconnect().await {
                Ok(()) => debug!("Closed connection to {}", remote),
                Err(e) => warn!("Failed to close connection to {}: {}", remote, e),
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use punchwire_core::command::soyal_status;
    use punchwire_core::packet::soyal::Packet;
    use punchwire_core::SOYAL_FRAME;
    use punchwire_transport::{MockConnector, MockTransport};

    fn address() -> DeviceAddress {
        DeviceAddress::new(1, "mock", 1621)
    }

    fn ack() -> Vec<u8> {
        Packet::short(1, soyal_status::ACK, Vec::new())
            .encode()
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_transient_session_closes_on_failure() {
        let connector = MockConnector::default();
        connector.transport().push_reply(ack()).push_timeout();

        let mut session = Session::open(&connector, &address(), Some(Duration::from_secs(1)), SOYAL_FRAME)
            .await
            .unwrap();
        assert!(session.is_transient());

        let first = session.exchange(&[0x7E]).await;
        let result = match first {
            Ok(_) => session.exchange(&[0x7E]).await.map(|_| ()),
            Err(e) => Err(e),
        };
        let result = session.finish(result).await;

        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(connector.opens(), 1);
        assert_eq!(connector.transport().disconnects(), 1);
    }

    #[tokio::test]
    async fn test_attached_session_leaves_connection_open() {
        let mock = MockTransport::new();
        mock.push_reply(ack());

        let mut transport: Box<dyn Transport> = Box::new(mock.clone());
        transport.connect().await.unwrap();

        let mut session = Session::attach(transport.as_mut(), 1, Some(Duration::from_secs(1)), SOYAL_FRAME);
        assert!(!session.is_transient());
        let reply = session.exchange(&[0x7E]).await;
        session.finish(reply).await.unwrap();

        assert!(mock.is_connected());
        assert_eq!(mock.disconnects(), 0);
    }

    #[tokio::test]
    async fn test_reply_timeout_defaults_to_transport() {
        let mock = MockTransport::new();
        mock.push_reply(ack()).push_reply(ack());

        let mut transport: Box<dyn Transport> = Box::new(mock.clone());
        transport.connect().await.unwrap();

        let mut session = Session::attach(transport.as_mut(), 1, None, SOYAL_FRAME);
        let reply = session.exchange(&[0x7E]).await;
        session.finish(reply).await.unwrap();

        let mut session = Session::attach(
            transport.as_mut(),
            1,
            Some(Duration::from_millis(1500)),
            SOYAL_FRAME,
        );
        let reply = session.exchange(&[0x7E]).await;
        session.finish(reply).await.unwrap();

        assert_eq!(mock.read_timeouts(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_open_failure_opens_nothing() {
        let connector = MockConnector::default();
        connector.transport().refuse_connections();

        let result = Session::open(&connector, &address(), Some(Duration::from_secs(1)), SOYAL_FRAME).await;
        assert!(result.is_err());
        assert_eq!(connector.transport().connects(), 0);
        assert_eq!(connector.transport().disconnects(), 0);
    }
}
