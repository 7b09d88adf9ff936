//! BLE beacon scanner runtime.
//!
//! This crate turns raw Bluetooth Low Energy advertisements into typed beacon
//! records and gives applications a small, callback-driven API for the two
//! things they usually want from nearby devices:
//!
//! - **Beacon scanning**: watch one manufacturer ID, deserialize its payloads
//!   and receive the records together with the originating advertisement
//! - **Scan-then-connect**: find the first device matching a filter, connect
//!   and verify a GATT characteristic, and hand the connection over
//!
//! # Threading model
//!
//! Every scanner posts its start/stop requests and its callbacks to a
//! [`Handler`], a FIFO queue with one worker task. Callbacks for one handler
//! never overlap, and a `stop()` posted from inside a callback runs before
//! any later report is delivered. Scanners can share a handler to serialize
//! their callbacks with each other.
//!
//! Scanners can also share a platform scanner. Each runs its own scan
//! session on it: stopping one scanner leaves the others scanning, and the
//! platform scan stops with the last session. Dropping every copy of a
//! scanner (and every [`ScanHandle`] to it) stops its session.
//!
//! # Platform Differences
//!
//! Device identification varies by platform due to differences in BLE implementations:
//!
//! - **macOS**: Devices are identified by a UUID assigned by CoreBluetooth. This UUID
//!   is stable for a given device on a given Mac, but differs between Macs.
//!
//! - **Linux/Windows**: Devices are identified by their Bluetooth MAC address
//!   (e.g., `AA:BB:CC:DD:EE:FF`).
//!
//! # Quick Start
//!
//! ```no_run
//! use bleacon_core::{AcquireOptions, BeaconScanner, BtleAdapter, obtain_scanner};
//! use bleacon_types::IBeaconDeserializer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = BtleAdapter::first().await?;
//!     let scanner = obtain_scanner(&adapter, &AcquireOptions::default()).await?;
//!
//!     let beacons = BeaconScanner::new(
//!         scanner,
//!         IBeaconDeserializer::MANUFACTURER_ID,
//!         IBeaconDeserializer,
//!         |_, report| {
//!             for beacon in &report.records {
//!                 println!("{} {}/{}", beacon.uuid, beacon.major, beacon.minor);
//!             }
//!         },
//!     );
//!     beacons.start();
//!
//!     tokio::signal::ctrl_c().await?;
//!     beacons.stop();
//!     beacons.flush().await;
//!     Ok(())
//! }
//! ```

pub mod acquire;
pub mod beacon_scanner;
pub mod btle;
pub mod error;
pub mod gatt_scanner;
pub mod handler;
pub mod mock;
pub mod platform;
pub mod session;
pub mod util;

// Re-export the data model so most users only need this crate
pub use bleacon_types::{
    Advertisement, BeaconDeserializer, BleFilter, IBeacon, IBeaconDeserializer, ParseError,
    RawBeacon, RawPayload, ScanMode, ScanSettings, uuids,
};

pub use acquire::{AcquireOptions, DEFAULT_POLL_INTERVAL, obtain_scanner};
pub use beacon_scanner::{BeaconReport, BeaconScanner, BeaconScannerBuilder};
pub use btle::{BtleAdapter, BtleConnection, BtleScanner};
pub use error::{ConnectionFailureReason, Error, Result};
pub use gatt_scanner::{GattCallback, GattScanner, GattScannerOptions, GattTarget};
pub use handler::Handler;
pub use mock::{MockAdapter, MockCall, MockConnection, MockScanner};
pub use platform::{
    AdvertisementStream, BleAdapter, BleScanner, GattConnection, NotificationStream, ScanSessions,
    SessionId,
};
pub use session::ScanHandle;
