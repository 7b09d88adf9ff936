//! Manufacturer-filtered beacon scanning.
//!
//! [`BeaconScanner`] watches advertisements for one manufacturer ID, pulls
//! out that manufacturer's payload, runs it through a
//! [`BeaconDeserializer`] and hands the records to a callback.
//!
//! Reports are dropped without any error or callback when:
//! - the advertisement carries no payload for the manufacturer ID,
//! - the payload is shorter than [`BeaconDeserializer::required_len`],
//! - the deserializer rejects the payload.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use bleacon_core::{AcquireOptions, BeaconScanner, BtleAdapter, obtain_scanner};
//! use bleacon_types::IBeaconDeserializer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = BtleAdapter::first().await?;
//!     let scanner = obtain_scanner(&adapter, &AcquireOptions::default()).await?;
//!
//!     let beacons = BeaconScanner::builder(IBeaconDeserializer::MANUFACTURER_ID, IBeaconDeserializer)
//!         .on_found(|handle, report| {
//!             for beacon in &report.records {
//!                 println!("{} major={} minor={}", beacon.uuid, beacon.major, beacon.minor);
//!             }
//!             // Give the radio a rest after every sighting
//!             handle.pause(Duration::from_secs(5));
//!         })
//!         .build(scanner);
//!
//!     beacons.start();
//!     tokio::time::sleep(Duration::from_secs(60)).await;
//!     beacons.stop();
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use bleacon_types::{Advertisement, BeaconDeserializer, BleFilter, ScanSettings};

use crate::handler::Handler;
use crate::platform::BleScanner;
use crate::session::{AdvertisementSink, ScanHandle};

/// Records deserialized from one advertisement.
#[derive(Debug, Clone)]
pub struct BeaconReport<T> {
    /// The advertisement the records came from.
    pub advertisement: Advertisement,
    /// The deserialized records.
    pub records: Vec<T>,
}

impl<T> BeaconReport<T> {
    /// Identifier of the advertising device.
    pub fn device_id(&self) -> &str {
        &self.advertisement.device_id
    }
}

type FoundCallback<T> = Box<dyn Fn(&ScanHandle, BeaconReport<T>) + Send + Sync>;

struct BeaconSink<D: BeaconDeserializer> {
    manufacturer_id: u16,
    deserializer: D,
    on_found: FoundCallback<D::Output>,
}

impl<D> AdvertisementSink for BeaconSink<D>
where
    D: BeaconDeserializer + 'static,
{
    fn on_advertisement(&self, handle: &ScanHandle, advertisement: Advertisement) {
        let Some(payload) = advertisement.manufacturer_payload(self.manufacturer_id) else {
            return;
        };

        let records = match self.deserializer.try_deserialize(payload) {
            Some(Ok(records)) => records,
            Some(Err(e)) => {
                debug!(device = %advertisement.device_id, "Dropping undecodable payload: {}", e);
                return;
            }
            None => return,
        };

        (self.on_found)(handle, BeaconReport {
            advertisement,
            records,
        });
    }
}

/// Builder for [`BeaconScanner`].
#[must_use]
pub struct BeaconScannerBuilder<D: BeaconDeserializer> {
    manufacturer_id: u16,
    deserializer: D,
    filters: Vec<BleFilter>,
    settings: ScanSettings,
    handler: Option<Handler>,
    on_found: Option<FoundCallback<D::Output>>,
}

impl<D> BeaconScannerBuilder<D>
where
    D: BeaconDeserializer + 'static,
{
    /// Add a scan filter. Without explicit filters the scanner filters on
    /// the manufacturer ID alone.
    pub fn filter(mut self, filter: BleFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Replace the scan filters.
    pub fn filters(mut self, filters: Vec<BleFilter>) -> Self {
        self.filters = filters;
        self
    }

    /// Set the scan settings (default: low power, immediate reporting).
    pub fn settings(mut self, settings: ScanSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Share a handler with other scanners or tasks.
    pub fn handler(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Set the callback for matched, deserialized advertisements.
    pub fn on_found<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ScanHandle, BeaconReport<D::Output>) + Send + Sync + 'static,
    {
        self.on_found = Some(Box::new(callback));
        self
    }

    /// Build the scanner. Must be called within a Tokio runtime.
    pub fn build(self, scanner: Arc<dyn BleScanner>) -> BeaconScanner {
        let filters = if self.filters.is_empty() {
            vec![BleFilter::manufacturer(self.manufacturer_id)]
        } else {
            self.filters
        };

        let sink = BeaconSink {
            manufacturer_id: self.manufacturer_id,
            deserializer: self.deserializer,
            on_found: self.on_found.unwrap_or_else(|| Box::new(|_, _| {})),
        };

        let handler = self.handler.unwrap_or_default();
        BeaconScanner {
            manufacturer_id: self.manufacturer_id,
            handle: ScanHandle::new(scanner, handler, filters, self.settings, Arc::new(sink)),
        }
    }
}

/// Scanner that reports deserialized beacon records for one manufacturer ID.
///
/// All operations are posted to the scanner's [`Handler`] and return
/// immediately.
#[derive(Debug, Clone)]
pub struct BeaconScanner {
    manufacturer_id: u16,
    handle: ScanHandle,
}

impl BeaconScanner {
    /// Start building a scanner for `manufacturer_id`.
    pub fn builder<D>(manufacturer_id: u16, deserializer: D) -> BeaconScannerBuilder<D>
    where
        D: BeaconDeserializer + 'static,
    {
        BeaconScannerBuilder {
            manufacturer_id,
            deserializer,
            filters: Vec::new(),
            settings: ScanSettings::LOW_POWER,
            handler: None,
            on_found: None,
        }
    }

    /// Create a scanner with default filters and settings.
    pub fn new<D, F>(
        scanner: Arc<dyn BleScanner>,
        manufacturer_id: u16,
        deserializer: D,
        on_found: F,
    ) -> Self
    where
        D: BeaconDeserializer + 'static,
        F: Fn(&ScanHandle, BeaconReport<D::Output>) + Send + Sync + 'static,
    {
        Self::builder(manufacturer_id, deserializer)
            .on_found(on_found)
            .build(scanner)
    }

    /// The manufacturer ID this scanner reports.
    pub fn manufacturer_id(&self) -> u16 {
        self.manufacturer_id
    }

    /// Start scanning.
    pub fn start(&self) {
        self.handle.start();
    }

    /// Stop scanning. Idempotent, and safe without a prior start.
    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Stop, then start again after `duration`.
    pub fn pause(&self, duration: Duration) {
        self.handle.pause(duration);
    }

    /// Whether a scan is running.
    pub fn is_scanning(&self) -> bool {
        self.handle.is_scanning()
    }

    /// Control handle, as passed to the found callback.
    pub fn handle(&self) -> &ScanHandle {
        &self.handle
    }

    /// Wait until every request posted so far has been processed.
    pub async fn flush(&self) {
        self.handle.handler().flush().await;
    }
}
