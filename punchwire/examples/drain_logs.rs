//! Drain the punch log and user list of a terminal into a memory store

use chrono::Local;
use punchwire::{DeviceAddress, MemoryStore, Terminal, Vendor};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let vendor: Vendor = std::env::var("VENDOR")
        .unwrap_or_else(|_| "anviz".to_string())
        .parse()?;
    let address: DeviceAddress = std::env::var("DEVICE")
        .unwrap_or_else(|_| "1@192.168.1.218:5010".to_string())
        .parse()?;

    let mut terminal = Terminal::new(vendor, address);
    let mut store = MemoryStore::new();

    let users = terminal.download_users(&mut store).await?;
    println!("Downloaded {} users", users);

    let punches = terminal.download_logs(1, &mut store, &Local).await?;
    println!("Drained {} punches", punches);

    for punch in store.punches() {
        println!(
            "{:>8} {} {}",
            punch.user_id,
            punch.timestamp.format("%Y-%m-%d %H:%M:%S"),
            punch.method
        );
    }

    Ok(())
}
