//! Example: Scanning for iBeacons
//!
//! This example acquires the first Bluetooth adapter, scans for Apple
//! iBeacon frames and prints each beacon it sees. After every sighting the
//! scanner pauses for two seconds.
//!
//! Run with: `cargo run --example scan_beacons`

use std::time::Duration;

use bleacon_core::{AcquireOptions, BeaconScanner, BtleAdapter, IBeaconDeserializer, obtain_scanner};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let adapter = BtleAdapter::first().await?;
    let options = AcquireOptions::new().timeout(Duration::from_secs(10));
    let scanner = obtain_scanner(&adapter, &options).await?;

    println!("Scanning for iBeacons (30 seconds)...");
    println!();

    let beacons = BeaconScanner::builder(IBeaconDeserializer::MANUFACTURER_ID, IBeaconDeserializer)
        .on_found(|handle, report| {
            let rssi = report.advertisement.rssi;
            for beacon in &report.records {
                println!("  {} major={} minor={}", beacon.uuid, beacon.major, beacon.minor);
                println!("    Device: {}", report.advertisement.device_id);
                if let Some(rssi) = rssi {
                    println!(
                        "    RSSI: {} dBm (~{:.1} m)",
                        rssi,
                        beacon.estimate_distance(rssi)
                    );
                }
            }
            handle.pause(Duration::from_secs(2));
        })
        .build(scanner);

    beacons.start();
    tokio::time::sleep(Duration::from_secs(30)).await;
    beacons.stop();
    beacons.flush().await;

    Ok(())
}
