//! `btleplug` implementation of the platform capability traits.
//!
//! btleplug cannot power an adapter on, so [`BtleAdapter::enable`] only logs
//! and the caller's poll loop waits for the user or the OS to do it.
//!
//! Starting and stopping a btleplug scan acts on the whole adapter. Every
//! [`BtleScanner`] handed out by one [`BtleAdapter`] shares a session
//! registry, so the adapter keeps scanning for the union of the live
//! sessions' filters until the last one stops. Scanners obtained from
//! separate `BtleAdapter::first` calls do not see each other's sessions.
//!
//! Some host stacks only raise a manufacturer-data event when the payload
//! changes. Device updates are therefore also turned into advertisements,
//! from the manufacturer data btleplug has cached for the device, so a
//! beacon with a static payload keeps being reported.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bleacon_types::{Advertisement, BleFilter, ScanSettings};

use crate::error::{Error, Result};
use crate::platform::{
    AdvertisementStream, BleAdapter, BleScanner, GattConnection, NotificationStream, ScanSessions,
    SessionId,
};
use crate::util::{create_identifier, format_peripheral_id, normalize_address};

/// Default connect timeout when `auto_connect` is off.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// The host's first Bluetooth adapter.
#[derive(Debug, Clone)]
pub struct BtleAdapter {
    adapter: Adapter,
    connect_timeout: Duration,
    sessions: Arc<Mutex<ScanSessions>>,
}

impl BtleAdapter {
    /// Open the first adapter reported by the host stack.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoAdapter`] if the host has none.
    pub async fn first() -> Result<Self> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;

        let adapter = adapters.into_iter().next().ok_or(Error::NoAdapter)?;
        if let Ok(info) = adapter.adapter_info().await {
            debug!("Using adapter {}", info);
        }
        Ok(Self::new(adapter))
    }

    /// Wrap an existing adapter.
    pub fn new(adapter: Adapter) -> Self {
        Self {
            adapter,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            sessions: Arc::new(Mutex::new(ScanSessions::new())),
        }
    }

    /// Timeout for non-auto connects.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl BleAdapter for BtleAdapter {
    async fn is_enabled(&self) -> Result<bool> {
        Ok(self.adapter.adapter_state().await? == CentralState::PoweredOn)
    }

    async fn enable(&self) -> Result<()> {
        warn!("Cannot power on the Bluetooth adapter from here; waiting for it to be enabled");
        Ok(())
    }

    async fn scanner(&self) -> Result<Option<Arc<dyn BleScanner>>> {
        if !self.is_enabled().await? {
            return Ok(None);
        }
        let scanner: Arc<dyn BleScanner> = Arc::new(BtleScanner {
            adapter: self.adapter.clone(),
            connect_timeout: self.connect_timeout,
            sessions: Arc::clone(&self.sessions),
        });
        Ok(Some(scanner))
    }
}

/// LE scanner backed by a btleplug [`Adapter`].
#[derive(Debug, Clone)]
pub struct BtleScanner {
    adapter: Adapter,
    connect_timeout: Duration,
    sessions: Arc<Mutex<ScanSessions>>,
}

/// Push the service filter down only when every filter names a service.
fn platform_filter(filters: &[BleFilter]) -> ScanFilter {
    let services: Option<Vec<Uuid>> = filters.iter().map(BleFilter::service).collect();
    match services {
        Some(services) if !filters.is_empty() => ScanFilter { services },
        _ => ScanFilter::default(),
    }
}

/// Payload from the event if it carried one, else the device's cached data.
fn select_manufacturer_data(
    event: Option<HashMap<u16, Vec<u8>>>,
    cached: Option<&HashMap<u16, Vec<u8>>>,
) -> Option<HashMap<u16, Vec<u8>>> {
    match (event, cached) {
        (Some(data), _) => Some(data),
        (None, Some(cached)) if !cached.is_empty() => Some(cached.clone()),
        (None, _) => None,
    }
}

/// Build an advertisement for a peripheral.
///
/// With `manufacturer_data` unset the device's cached manufacturer data is
/// used, and devices without any produce no advertisement.
async fn advertisement_for(
    adapter: &Adapter,
    id: &PeripheralId,
    manufacturer_data: Option<HashMap<u16, Vec<u8>>>,
) -> Option<Advertisement> {
    let properties = match adapter.peripheral(id).await {
        Ok(peripheral) => peripheral.properties().await.ok().flatten(),
        Err(_) => None,
    };

    let manufacturer_data = select_manufacturer_data(
        manufacturer_data,
        properties.as_ref().map(|props| &props.manufacturer_data),
    )?;

    let mut advertisement = Advertisement::new(format_peripheral_id(id));
    advertisement.manufacturer_data = manufacturer_data.into_iter().collect::<BTreeMap<_, _>>();
    if let Some(props) = properties {
        advertisement.device_id = create_identifier(&props.address.to_string(), id);
        advertisement.name = props.local_name;
        advertisement.rssi = props.rssi;
        advertisement.tx_power = props.tx_power_level;
        advertisement.services = props.services;
    }
    Some(advertisement)
}

impl BtleScanner {
    async fn find_peripheral(&self, device_id: &str) -> Result<Peripheral> {
        let wanted = normalize_address(device_id);
        for peripheral in self.adapter.peripherals().await? {
            let id = peripheral.id();
            let identifier = match peripheral.properties().await? {
                Some(props) => create_identifier(&props.address.to_string(), &id),
                None => format_peripheral_id(&id),
            };
            if normalize_address(&identifier) == wanted {
                return Ok(peripheral);
            }
        }
        Err(Error::DeviceNotFound(device_id.to_string()))
    }

    /// (Re)start the adapter scan. btleplug cannot change the filter of a
    /// running scan, so a running scan is stopped first.
    async fn restart_platform_scan(&self, running: bool, filter: ScanFilter) -> Result<()> {
        if running {
            self.adapter.stop_scan().await?;
        }
        self.adapter.start_scan(filter).await?;
        Ok(())
    }
}

#[async_trait]
impl BleScanner for BtleScanner {
    async fn start_scan(
        &self,
        session: SessionId,
        filters: &[BleFilter],
        settings: &ScanSettings,
    ) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let running = !sessions.is_empty();
        let before = platform_filter(&sessions.filters());
        if !sessions.insert(session, filters) {
            return Ok(());
        }

        let after = platform_filter(&sessions.filters());
        if running && before.services == after.services {
            debug!(%session, live = sessions.len(), "Platform scan already covers session");
            return Ok(());
        }

        // Scan mode and report delay have no btleplug equivalent
        debug!(
            %session,
            mode = %settings.mode,
            batched = settings.is_batched(),
            services = after.services.len(),
            "Starting platform scan"
        );
        if let Err(e) = self.restart_platform_scan(running, after).await {
            sessions.remove(session);
            return Err(e);
        }
        Ok(())
    }

    async fn stop_scan(&self, session: SessionId) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let before = platform_filter(&sessions.filters());
        if !sessions.remove(session) {
            return Ok(());
        }

        if sessions.is_empty() {
            debug!(%session, "Stopping platform scan");
            self.adapter.stop_scan().await?;
            return Ok(());
        }

        let after = platform_filter(&sessions.filters());
        if before.services != after.services {
            debug!(%session, live = sessions.len(), "Narrowing platform scan");
            self.restart_platform_scan(true, after).await?;
        }
        Ok(())
    }

    async fn advertisements(&self) -> Result<AdvertisementStream> {
        let events = self.adapter.events().await?;
        let adapter = self.adapter.clone();

        let stream = events.filter_map(move |event| {
            let adapter = adapter.clone();
            async move {
                match event {
                    CentralEvent::ManufacturerDataAdvertisement {
                        id,
                        manufacturer_data,
                    } => advertisement_for(&adapter, &id, Some(manufacturer_data)).await,
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        advertisement_for(&adapter, &id, None).await
                    }
                    _ => None,
                }
            }
        });
        Ok(stream.boxed())
    }

    #[tracing::instrument(level = "info", skip(self))]
    async fn connect(
        &self,
        device_id: &str,
        auto_connect: bool,
    ) -> Result<Arc<dyn GattConnection>> {
        let peripheral = self.find_peripheral(device_id).await?;

        info!("Connecting to device...");
        if auto_connect {
            peripheral.connect().await?;
        } else {
            timeout(self.connect_timeout, peripheral.connect())
                .await
                .map_err(|_| Error::timeout("connect to device", self.connect_timeout))??;
        }
        info!("Connected!");

        Ok(Arc::new(BtleConnection {
            device_id: device_id.to_string(),
            peripheral,
        }))
    }
}

/// A connected btleplug [`Peripheral`].
#[derive(Debug)]
pub struct BtleConnection {
    device_id: String,
    peripheral: Peripheral,
}

impl BtleConnection {
    fn find_characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| Error::characteristic_not_found(uuid, Uuid::nil()))
    }
}

#[async_trait]
impl GattConnection for BtleConnection {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn discover(&self, service: Uuid, characteristic: Uuid) -> Result<()> {
        self.peripheral.discover_services().await?;

        let services = self.peripheral.services();
        debug!("Found {} services", services.len());

        let found = services
            .iter()
            .find(|s| s.uuid == service)
            .ok_or(Error::ServiceNotFound { uuid: service })?;
        if found.characteristics.iter().any(|c| c.uuid == characteristic) {
            Ok(())
        } else {
            Err(Error::characteristic_not_found(characteristic, service))
        }
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        let chr = self.find_characteristic(characteristic)?;
        Ok(self.peripheral.read(&chr).await?)
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let chr = self.find_characteristic(characteristic)?;
        self.peripheral
            .write(&chr, data, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream> {
        let chr = self.find_characteristic(characteristic)?;
        self.peripheral.subscribe(&chr).await?;

        let notifications = self.peripheral.notifications().await?;
        let stream = notifications.filter_map(move |n| async move {
            (n.uuid == characteristic).then_some(n.value)
        });
        Ok(stream.boxed())
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
