//! Read a terminal clock and optionally sync it to the host
//!
//! ```text
//! VENDOR=anviz DEVICE=1@192.168.1.218:5010 SYNC=1 cargo run --example read_clock
//! ```

use chrono::Local;
use punchwire::{DeviceAddress, Terminal, Vendor};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let vendor: Vendor = std::env::var("VENDOR")
        .unwrap_or_else(|_| "soyal".to_string())
        .parse()?;
    let address: DeviceAddress = std::env::var("DEVICE")
        .unwrap_or_else(|_| "1@192.168.1.218:1621".to_string())
        .parse()?;

    let mut terminal = Terminal::new(vendor, address);

    let clock = terminal.get_time(&Local).await?;
    println!("Device clock: {}", clock);
    println!("Host clock:   {}", Local::now());

    if std::env::var("SYNC").is_ok() {
        terminal.set_time(&Local::now()).await?;
        println!("Clock synced");
    }

    Ok(())
}
