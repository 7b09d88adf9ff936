//! Capability interface over the host Bluetooth stack.
//!
//! The scanner runtime never talks to an OS API directly. It drives a
//! [`BleAdapter`] to obtain a [`BleScanner`], and a scanner to obtain
//! advertisements and [`GattConnection`]s. The [`btle`](crate::btle) module
//! implements these traits on top of `btleplug`; [`mock`](crate::mock)
//! implements them in memory for tests.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::Stream;
use uuid::Uuid;

use bleacon_types::{Advertisement, BleFilter, ScanSettings};

use crate::error::Result;

/// Stream of advertisement reports from a running scan.
pub type AdvertisementStream = Pin<Box<dyn Stream<Item = Advertisement> + Send>>;

/// Stream of characteristic notification values.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// Identifies one scanner's session on a shared platform scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// A process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Live scan sessions on one platform scanner, with their filters.
///
/// Backends use this to keep the platform scan running while any session is
/// live and to scan for the union of what the live sessions ask for.
#[derive(Debug, Clone, Default)]
pub struct ScanSessions {
    live: BTreeMap<SessionId, Vec<BleFilter>>,
}

impl ScanSessions {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Returns `false` if it was already live.
    pub fn insert(&mut self, session: SessionId, filters: &[BleFilter]) -> bool {
        if self.live.contains_key(&session) {
            return false;
        }
        self.live.insert(session, filters.to_vec());
        true
    }

    /// Unregister a session. Returns `false` if it was not live.
    pub fn remove(&mut self, session: SessionId) -> bool {
        self.live.remove(&session).is_some()
    }

    /// Whether `session` is live.
    pub fn contains(&self, session: SessionId) -> bool {
        self.live.contains_key(&session)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Union of the live sessions' filters.
    ///
    /// Empty when nothing is live, or when any live session scans without
    /// filters (which admits every advertisement).
    pub fn filters(&self) -> Vec<BleFilter> {
        if self.live.values().any(Vec::is_empty) {
            return Vec::new();
        }
        let mut union: Vec<BleFilter> = Vec::new();
        for filter in self.live.values().flatten() {
            if !union.contains(filter) {
                union.push(filter.clone());
            }
        }
        union
    }
}

/// A Bluetooth adapter that can hand out a scanner once it is powered.
#[async_trait]
pub trait BleAdapter: Send + Sync {
    /// Whether the adapter is powered on.
    async fn is_enabled(&self) -> Result<bool>;

    /// Ask the host to power the adapter on.
    ///
    /// Backends that cannot do this should log and return `Ok(())`; the
    /// caller keeps polling for a scanner either way.
    async fn enable(&self) -> Result<()>;

    /// The LE scanner, if the platform has one available right now.
    async fn scanner(&self) -> Result<Option<Arc<dyn BleScanner>>>;
}

/// Platform LE scanner.
///
/// One platform scanner can serve several scanners at once. Each one scans
/// under its own [`SessionId`]; the platform scan runs while any session is
/// live and covers the filters of every live session.
#[async_trait]
pub trait BleScanner: Send + Sync + 'static {
    /// Start a scan session with the given filters and settings.
    ///
    /// Backends may push the filters down to the OS; they must not deliver
    /// fewer advertisements than the filters allow. Starting a live session
    /// again is a no-op.
    async fn start_scan(
        &self,
        session: SessionId,
        filters: &[BleFilter],
        settings: &ScanSettings,
    ) -> Result<()>;

    /// End a scan session. The platform scan stops with the last session.
    ///
    /// Stopping a session that is not live is not an error.
    async fn stop_scan(&self, session: SessionId) -> Result<()>;

    /// Subscribe to advertisement reports.
    ///
    /// Reports delivered before this call are not replayed.
    async fn advertisements(&self) -> Result<AdvertisementStream>;

    /// Connect to a discovered device.
    ///
    /// With `auto_connect` the backend waits for the device to become
    /// reachable instead of failing fast.
    async fn connect(&self, device_id: &str, auto_connect: bool)
    -> Result<Arc<dyn GattConnection>>;
}

/// An established GATT connection.
#[async_trait]
pub trait GattConnection: Send + Sync {
    /// Identifier of the connected device.
    fn device_id(&self) -> &str;

    /// Discover services and check that `characteristic` exists in `service`.
    async fn discover(&self, service: Uuid, characteristic: Uuid) -> Result<()>;

    /// Read a characteristic value.
    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>>;

    /// Write a characteristic value (with response).
    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()>;

    /// Enable notifications and stream the values.
    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream>;

    /// Close the connection.
    async fn disconnect(&self) -> Result<()>;
}
