//! Example: Connect and read the battery level
//!
//! Scans for the first device advertising the given manufacturer ID,
//! connects to it and reads the standard Battery Level characteristic.
//!
//! Run with: `cargo run --example connect_characteristic -- 0x0059`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bleacon_core::uuids::{BATTERY_LEVEL, BATTERY_SERVICE};
use bleacon_core::{
    AcquireOptions, BleFilter, BtleAdapter, GattCallback, GattConnection, GattScanner, GattTarget,
    ScanHandle, obtain_scanner,
};
use tokio::sync::mpsc;

struct ReadBattery {
    done: mpsc::UnboundedSender<()>,
}

#[async_trait]
impl GattCallback for ReadBattery {
    async fn on_connected(
        &self,
        _handle: &ScanHandle,
        connection: Arc<dyn GattConnection>,
        target: GattTarget,
    ) {
        match connection.read(target.characteristic).await {
            Ok(value) => println!(
                "{}: battery {}%",
                connection.device_id(),
                value.first().copied().unwrap_or_default()
            ),
            Err(e) => eprintln!("Read failed: {}", e),
        }
        let _ = connection.disconnect().await;
        let _ = self.done.send(());
    }
}

fn parse_id(arg: &str) -> Option<u16> {
    match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => arg.parse().ok(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let manufacturer_id = std::env::args()
        .nth(1)
        .and_then(|arg| parse_id(&arg))
        .unwrap_or(bleacon_core::uuids::NORDIC_MANUFACTURER_ID);

    let adapter = BtleAdapter::first().await?;
    let scanner = obtain_scanner(&adapter, &AcquireOptions::default()).await?;

    let (done, mut rx) = mpsc::unbounded_channel();
    let gatt = GattScanner::new(
        scanner,
        BleFilter::manufacturer(manufacturer_id),
        BATTERY_SERVICE,
        BATTERY_LEVEL,
        ReadBattery { done },
    );

    println!("Looking for a device from manufacturer 0x{:04X}...", manufacturer_id);
    gatt.start();

    if tokio::time::timeout(Duration::from_secs(30), rx.recv()).await.is_err() {
        println!("No device found.");
    }
    gatt.stop();
    gatt.flush().await;

    Ok(())
}
