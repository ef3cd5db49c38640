//! High-level terminal interface

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone};
use tracing::{debug, info};

use punchwire_core::{FrameSizer, ANVIZ_FRAME, SOYAL_FRAME};
use punchwire_transport::{Connector, TcpConnector, Transport};
use punchwire_types::{DeviceAddress, Vendor};

use crate::error::Result;
use crate::session::Session;
use crate::store::Store;
use crate::{anviz, soyal};

/// One addressed attendance terminal
///
/// Every operation runs in its own [`Session`]. Without a connection of its
/// own, a terminal opens one through its connector for each operation and
/// closes it when the operation ends, on success and failure alike.
///
/// # Examples
///
/// ```no_run
/// use chrono::Local;
/// use punchwire::{DeviceAddress, Terminal, Vendor};
///
/// #[tokio::main]
/// async fn main() -> punchwire::Result<()> {
///     let address = DeviceAddress::new(1, "192.168.1.218", 5010);
///     let mut terminal = Terminal::new(Vendor::Anviz, address);
///
///     let now = terminal.get_time(&Local).await?;
///     println!("Device clock: {}", now);
///     Ok(())
/// }
/// ```
pub struct Terminal {
    vendor: Vendor,
    address: DeviceAddress,
    connector: Arc<dyn Connector>,
    connection: Option<Box<dyn Transport>>,
    timeout: Option<Duration>,
}

impl Terminal {
    /// Create a terminal reached over TCP
    pub fn new(vendor: Vendor, address: DeviceAddress) -> Self {
        Self {
            vendor,
            address,
            connector: Arc::new(TcpConnector::new()),
            connection: None,
            timeout: None,
        }
    }

    /// Override the transport's read timeout for every reply
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Open per-operation connections through `connector`
    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Run every operation over an already open connection
    ///
    /// The terminal never opens or closes it.
    pub fn with_connection(mut self, connection: Box<dyn Transport>) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Hand the supplied connection back
    pub fn take_connection(&mut self) -> Option<Box<dyn Transport>> {
        self.connection.take()
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    fn sizer(&self) -> FrameSizer {
        match self.vendor {
            Vendor::Anviz => ANVIZ_FRAME,
            Vendor::Soyal => SOYAL_FRAME,
        }
    }

    async fn session(&mut self) -> Result<Session<'_>> {
        let sizer = self.sizer();
        match self.connection.as_mut() {
            Some(connection) => Ok(Session::attach(
                connection.as_mut(),
                self.address.device_id,
                self.timeout,
                sizer,
            )),
            None => Session::open(self.connector.as_ref(), &self.address, self.timeout, sizer).await,
        }
    }

    /// Read the device clock in `zone`
    pub async fn get_time<Tz: TimeZone>(&mut self, zone: &Tz) -> Result<DateTime<Tz>> {
        debug!("Reading clock of {} terminal {}", self.vendor, self.address);
        let vendor = self.vendor;
        let mut session = self.session().await?;

        let result = match vendor {
            Vendor::Anviz => anviz::get_time(&mut session, zone).await,
            Vendor::Soyal => soyal::get_time(&mut session, zone).await,
        };
        session.finish(result).await
    }

    /// Set the device clock to the wall-clock fields of `at`
    pub async fn set_time<Tz: TimeZone>(&mut self, at: &DateTime<Tz>) -> Result<()> {
        info!("Setting clock of {} terminal {}", self.vendor, self.address);
        let vendor = self.vendor;
        let mut session = self.session().await?;

        let result = match vendor {
            Vendor::Anviz => anviz::set_time(&mut session, at).await,
            Vendor::Soyal => soyal::set_time(&mut session, at).await,
        };
        session.finish(result).await
    }

    /// Move the device's punch log into `store`
    ///
    /// `terminal` is stamped on every stored punch. Returns the number of
    /// punches stored.
    pub async fn download_logs<Tz: TimeZone + Sync>(
        &mut self,
        terminal: i64,
        store: &mut dyn Store,
        zone: &Tz,
    ) -> Result<usize> {
        info!("Downloading logs from {} terminal {}", self.vendor, self.address);
        let vendor = self.vendor;
        let mut session = self.session().await?;

        let result = match vendor {
            Vendor::Anviz => anviz::download_logs(&mut session, store, terminal, zone).await,
            Vendor::Soyal => soyal::download_logs(&mut session, store, terminal, zone).await,
        };
        let result = session.finish(result).await;

        if let Ok(count) = &result {
            info!("Stored {} new punches", count);
        }
        result
    }

    /// Copy users (and templates) from the device into `store`
    pub async fn download_users(&mut self, store: &mut dyn Store) -> Result<usize> {
        info!("Downloading users from {} terminal {}", self.vendor, self.address);
        let vendor = self.vendor;
        let mut session = self.session().await?;

        let result = match vendor {
            Vendor::Anviz => anviz::download_users(&mut session, store).await,
            Vendor::Soyal => soyal::download_users(&mut session, store).await,
        };
        let result = session.finish(result).await;

        if let Ok(count) = &result {
            info!("Stored {} users", count);
        }
        result
    }

    /// Write the stored users among `user_ids` to the device
    pub async fn upload_users(&mut self, store: &mut dyn Store, user_ids: &[u64]) -> Result<usize> {
        info!(
            "Uploading {} users to {} terminal {}",
            user_ids.len(),
            self.vendor,
            self.address
        );
        let vendor = self.vendor;
        let mut session = self.session().await?;

        let result = match vendor {
            Vendor::Anviz => anviz::upload_users(&mut session, store, user_ids).await,
            Vendor::Soyal => soyal::upload_users(&mut session, store, user_ids).await,
        };
        session.finish(result).await
    }

    /// Remove every user from the device
    ///
    /// Soyal terminals are left untouched: the operation succeeds without
    /// opening a connection.
    pub async fn delete_all_users(&mut self) -> Result<()> {
        match self.vendor {
            Vendor::Anviz => {
                info!("Deleting all users on terminal {}", self.address);
                let mut session = self.session().await?;
                let result = anviz::delete_all_users(&mut session).await;
                session.finish(result).await
            }
            Vendor::Soyal => {
                debug!("Delete all users is a no-op on Soyal terminal {}", self.address);
                Ok(())
            }
        }
    }
}
