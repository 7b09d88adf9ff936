//! Scan-then-connect to a GATT characteristic.
//!
//! [`GattScanner`] scans with a single [`BleFilter`]. When a device matches,
//! it connects, checks that the device exposes the target service and
//! characteristic, and passes the connection to a [`GattCallback`].
//!
//! With `stop_when_found` (the default) the scan stops on the first match and
//! later reports from the same session are ignored, so at most one connection
//! is attempted per start.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use bleacon_types::{Advertisement, BleFilter, ScanSettings};

use crate::error::Error;
use crate::handler::Handler;
use crate::platform::{BleScanner, GattConnection};
use crate::session::{AdvertisementSink, ScanHandle};

/// The service and characteristic a [`GattScanner`] connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GattTarget {
    /// Service UUID.
    pub service: Uuid,
    /// Characteristic UUID within the service.
    pub characteristic: Uuid,
}

/// Receives the outcome of a [`GattScanner`] connection attempt.
#[async_trait]
pub trait GattCallback: Send + Sync + 'static {
    /// The device is connected and exposes the target characteristic.
    async fn on_connected(
        &self,
        handle: &ScanHandle,
        connection: Arc<dyn GattConnection>,
        target: GattTarget,
    );

    /// Connecting or discovering the target failed.
    fn on_error(&self, device_id: &str, error: &Error) {
        warn!(device = device_id, "GATT connection failed: {}", error);
    }
}

/// Options for [`GattScanner`].
#[derive(Debug, Clone)]
pub struct GattScannerOptions {
    /// Scan settings.
    pub settings: ScanSettings,
    /// Wait for the device to become reachable instead of failing fast.
    pub auto_connect: bool,
    /// Stop scanning on the first match.
    pub stop_when_found: bool,
    /// Handler to share with other asynchronous actions.
    pub handler: Option<Handler>,
}

impl Default for GattScannerOptions {
    fn default() -> Self {
        Self {
            settings: ScanSettings::default(),
            auto_connect: false,
            stop_when_found: true,
            handler: None,
        }
    }
}

impl GattScannerOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan settings.
    pub fn settings(mut self, settings: ScanSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set whether to auto-connect.
    pub fn auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    /// Set whether to stop on the first match.
    pub fn stop_when_found(mut self, stop: bool) -> Self {
        self.stop_when_found = stop;
        self
    }

    /// Share a handler.
    pub fn handler(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }
}

struct GattSink {
    scanner: Arc<dyn BleScanner>,
    target: GattTarget,
    auto_connect: bool,
    stop_when_found: bool,
    found: AtomicBool,
    callback: Arc<dyn GattCallback>,
}

impl GattSink {
    fn connect_device(&self, handle: &ScanHandle, advertisement: &Advertisement) {
        if self.stop_when_found {
            if self.found.swap(true, Ordering::SeqCst) {
                return;
            }
            handle.stop();
        }

        let scanner = Arc::clone(&self.scanner);
        let callback = Arc::clone(&self.callback);
        let connected_handle = handle.clone();
        let target = self.target;
        let auto_connect = self.auto_connect;
        let device_id = advertisement.device_id.clone();

        let connect = async move {
            info!(device = %device_id, auto_connect, "Connecting to device");
            let connection = match scanner.connect(&device_id, auto_connect).await {
                Ok(connection) => connection,
                Err(e) => {
                    callback.on_error(&device_id, &e);
                    return;
                }
            };

            if let Err(e) = connection
                .discover(target.service, target.characteristic)
                .await
            {
                callback.on_error(&device_id, &e);
                let _ = connection.disconnect().await;
                return;
            }

            callback.on_connected(&connected_handle, connection, target).await;
        };

        // Queue behind the stop so the scan is down before the connect starts.
        // The connection itself runs off the handler; it may wait indefinitely.
        handle.handler().post(async move {
            tokio::spawn(connect);
        });
    }
}

impl AdvertisementSink for GattSink {
    fn on_session_start(&self) {
        self.found.store(false, Ordering::SeqCst);
    }

    fn on_advertisement(&self, handle: &ScanHandle, advertisement: Advertisement) {
        self.connect_device(handle, &advertisement);
    }

    fn on_batch(&self, handle: &ScanHandle, advertisements: Vec<Advertisement>) {
        if let Some(first) = advertisements.first() {
            self.connect_device(handle, first);
        }
    }
}

/// Scanner that connects to the first device matching a filter.
#[derive(Debug, Clone)]
pub struct GattScanner {
    target: GattTarget,
    handle: ScanHandle,
}

impl GattScanner {
    /// Create a scanner with default options.
    pub fn new(
        scanner: Arc<dyn BleScanner>,
        filter: BleFilter,
        service: Uuid,
        characteristic: Uuid,
        callback: impl GattCallback,
    ) -> Self {
        Self::with_options(
            scanner,
            filter,
            service,
            characteristic,
            callback,
            GattScannerOptions::default(),
        )
    }

    /// Create a scanner with custom options.
    pub fn with_options(
        scanner: Arc<dyn BleScanner>,
        filter: BleFilter,
        service: Uuid,
        characteristic: Uuid,
        callback: impl GattCallback,
        options: GattScannerOptions,
    ) -> Self {
        let target = GattTarget {
            service,
            characteristic,
        };
        let sink = GattSink {
            scanner: Arc::clone(&scanner),
            target,
            auto_connect: options.auto_connect,
            stop_when_found: options.stop_when_found,
            found: AtomicBool::new(false),
            callback: Arc::new(callback),
        };

        let handler = options.handler.unwrap_or_default();
        Self {
            target,
            handle: ScanHandle::new(scanner, handler, vec![filter], options.settings, Arc::new(sink)),
        }
    }

    /// The service and characteristic this scanner connects to.
    pub fn target(&self) -> GattTarget {
        self.target
    }

    /// Start scanning.
    pub fn start(&self) {
        self.handle.start();
    }

    /// Stop scanning. Idempotent, and safe without a prior start.
    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Whether a scan is running.
    pub fn is_scanning(&self) -> bool {
        self.handle.is_scanning()
    }

    /// Control handle.
    pub fn handle(&self) -> &ScanHandle {
        &self.handle
    }

    /// Wait until every request posted so far has been processed.
    pub async fn flush(&self) {
        self.handle.handler().flush().await;
    }
}
