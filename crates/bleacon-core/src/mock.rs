//! In-memory platform for testing.
//!
//! This module provides a mock adapter, scanner and GATT connection that can
//! be used for unit testing without requiring actual BLE hardware.
//!
//! # Features
//!
//! - **Call log**: every start/stop/connect is recorded with the (Tokio) time it happened
//! - **Session accounting**: the mock scans while any session is live, like a real backend
//! - **Advertisement injection**: push reports to all live scan sessions
//! - **Failure injection**: make connects fail
//! - **Slow adapters**: make the scanner appear only after a number of polls
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use bleacon_core::{BeaconScanner, MockScanner};
//! use bleacon_types::{Advertisement, RawPayload};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = Arc::new(MockScanner::new());
//!     let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//!     let scanner = BeaconScanner::new(mock.clone(), 0x0059, RawPayload::new(1), move |_, report| {
//!         let _ = tx.send(report.records);
//!     });
//!
//!     scanner.start();
//!     scanner.flush().await;
//!     mock.advertise(Advertisement::new("dev").with_manufacturer_data(0x0059, [42]));
//!
//!     assert_eq!(rx.recv().await.unwrap()[0].payload, vec![42]);
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::trace;
use uuid::Uuid;

use bleacon_types::{Advertisement, BleFilter, ScanSettings};

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::platform::{
    AdvertisementStream, BleAdapter, BleScanner, GattConnection, NotificationStream, ScanSessions,
    SessionId,
};

/// A random identifier of the form `MOCK-XXXXXX`.
pub fn mock_device_id() -> String {
    format!("MOCK-{:06X}", rand::random::<u32>() % 0xFFFFFF)
}

/// A platform call recorded by [`MockScanner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// `start_scan` was called.
    StartScan {
        /// Filters passed to the platform.
        filters: Vec<BleFilter>,
        /// Settings passed to the platform.
        settings: ScanSettings,
    },
    /// `stop_scan` was called.
    StopScan,
    /// `connect` was called.
    Connect {
        /// Target device.
        device_id: String,
        /// Auto-connect flag.
        auto_connect: bool,
    },
}

impl MockCall {
    /// Short name of the call: `"start"`, `"stop"` or `"connect"`.
    pub fn kind(&self) -> &'static str {
        match self {
            MockCall::StartScan { .. } => "start",
            MockCall::StopScan => "stop",
            MockCall::Connect { .. } => "connect",
        }
    }
}

type ServiceTable = HashMap<Uuid, HashMap<Uuid, Vec<u8>>>;

/// A mock LE scanner.
pub struct MockScanner {
    sender: broadcast::Sender<Advertisement>,
    calls: Mutex<Vec<(Instant, MockCall)>>,
    sessions: Mutex<ScanSessions>,
    fail_connect: AtomicBool,
    services: Mutex<ServiceTable>,
    connections: Mutex<Vec<Arc<MockConnection>>>,
}

impl std::fmt::Debug for MockScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockScanner")
            .field("sessions", &self.live_sessions())
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl Default for MockScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScanner {
    /// Create a scanner with no GATT services.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            sender,
            calls: Mutex::new(Vec::new()),
            sessions: Mutex::new(ScanSessions::new()),
            fail_connect: AtomicBool::new(false),
            services: Mutex::new(HashMap::new()),
            connections: Mutex::new(Vec::new()),
        }
    }

    /// Expose a characteristic with an initial value on every device.
    #[must_use]
    pub fn with_characteristic(self, service: Uuid, characteristic: Uuid, value: Vec<u8>) -> Self {
        if let Ok(mut services) = self.services.lock() {
            services
                .entry(service)
                .or_default()
                .insert(characteristic, value);
        }
        self
    }

    /// Make subsequent connects fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Deliver an advertisement to every live subscriber.
    ///
    /// Returns the number of subscribers that received it.
    pub fn advertise(&self, advertisement: Advertisement) -> usize {
        self.sender.send(advertisement).unwrap_or(0)
    }

    /// Whether the platform scan is running, i.e. any session is live.
    pub fn is_scanning(&self) -> bool {
        self.live_sessions() > 0
    }

    /// Number of live scan sessions.
    pub fn live_sessions(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Filters the platform scan currently covers (the union over live sessions).
    pub fn active_filters(&self) -> Vec<BleFilter> {
        self.sessions.lock().map(|s| s.filters()).unwrap_or_default()
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.call_log().into_iter().map(|(_, call)| call).collect()
    }

    /// All recorded calls with the time they were made.
    pub fn call_log(&self) -> Vec<(Instant, MockCall)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of `start_scan` calls.
    pub fn start_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::StartScan { .. }))
            .count()
    }

    /// Connections handed out so far.
    pub fn connections(&self) -> Vec<Arc<MockConnection>> {
        self.connections
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: MockCall) {
        trace!(?call, "mock call");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((Instant::now(), call));
        }
    }
}

#[async_trait]
impl BleScanner for MockScanner {
    async fn start_scan(
        &self,
        session: SessionId,
        filters: &[BleFilter],
        settings: &ScanSettings,
    ) -> Result<()> {
        self.record(MockCall::StartScan {
            filters: filters.to_vec(),
            settings: *settings,
        });
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(session, filters);
        }
        Ok(())
    }

    async fn stop_scan(&self, session: SessionId) -> Result<()> {
        self.record(MockCall::StopScan);
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.remove(session);
        }
        Ok(())
    }

    async fn advertisements(&self) -> Result<AdvertisementStream> {
        let receiver = self.sender.subscribe();
        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(advertisement) => return Some((advertisement, receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        trace!(skipped, "mock subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn connect(
        &self,
        device_id: &str,
        auto_connect: bool,
    ) -> Result<Arc<dyn GattConnection>> {
        self.record(MockCall::Connect {
            device_id: device_id.to_string(),
            auto_connect,
        });

        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::connection_failed(
                device_id,
                ConnectionFailureReason::OutOfRange,
            ));
        }

        let services = self
            .services
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        let connection = Arc::new(MockConnection::new(device_id, services));
        if let Ok(mut connections) = self.connections.lock() {
            connections.push(Arc::clone(&connection));
        }
        Ok(connection)
    }
}

/// A mock GATT connection backed by an in-memory service table.
pub struct MockConnection {
    device_id: String,
    services: Mutex<ServiceTable>,
    notifications: broadcast::Sender<(Uuid, Vec<u8>)>,
    connected: AtomicBool,
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection")
            .field("device_id", &self.device_id)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockConnection {
    fn new(device_id: &str, services: ServiceTable) -> Self {
        let (notifications, _) = broadcast::channel(64);
        Self {
            device_id: device_id.to_string(),
            services: Mutex::new(services),
            notifications,
            connected: AtomicBool::new(true),
        }
    }

    /// Push a notification to subscribers of `characteristic`.
    pub fn notify(&self, characteristic: Uuid, value: Vec<u8>) -> usize {
        self.notifications
            .send((characteristic, value))
            .unwrap_or(0)
    }

    /// Whether [`disconnect`](GattConnection::disconnect) has been called.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    fn lookup(&self, characteristic: Uuid) -> Option<Vec<u8>> {
        let services = self.services.lock().ok()?;
        services
            .values()
            .find_map(|chars| chars.get(&characteristic).cloned())
    }
}

#[async_trait]
impl GattConnection for MockConnection {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn discover(&self, service: Uuid, characteristic: Uuid) -> Result<()> {
        self.ensure_connected()?;
        let services = self.services.lock().map_err(|_| Error::NotConnected)?;
        let chars = services
            .get(&service)
            .ok_or(Error::ServiceNotFound { uuid: service })?;
        if chars.contains_key(&characteristic) {
            Ok(())
        } else {
            Err(Error::characteristic_not_found(characteristic, service))
        }
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        self.ensure_connected()?;
        self.lookup(characteristic)
            .ok_or_else(|| Error::characteristic_not_found(characteristic, Uuid::nil()))
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        self.ensure_connected()?;
        let mut services = self.services.lock().map_err(|_| Error::NotConnected)?;
        let slot = services
            .values_mut()
            .find_map(|chars| chars.get_mut(&characteristic))
            .ok_or_else(|| Error::characteristic_not_found(characteristic, Uuid::nil()))?;
        *slot = data.to_vec();
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream> {
        self.ensure_connected()?;
        let receiver = self.notifications.subscribe();
        let stream = futures::stream::unfold(receiver, move |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok((uuid, value)) if uuid == characteristic => return Some((value, receiver)),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// A mock adapter.
///
/// Starts enabled with the scanner available on the first poll.
pub struct MockAdapter {
    scanner: Arc<MockScanner>,
    enabled: AtomicBool,
    enable_calls: AtomicU32,
    polls: AtomicU32,
    ready_after: AtomicU32,
}

impl std::fmt::Debug for MockAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockAdapter")
            .field("enabled", &self.enabled.load(Ordering::Relaxed))
            .field("polls", &self.polls.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdapter {
    /// Create an enabled adapter with a fresh [`MockScanner`].
    pub fn new() -> Self {
        Self::with_scanner(Arc::new(MockScanner::new()))
    }

    /// Create an enabled adapter around an existing scanner.
    pub fn with_scanner(scanner: Arc<MockScanner>) -> Self {
        Self {
            scanner,
            enabled: AtomicBool::new(true),
            enable_calls: AtomicU32::new(0),
            polls: AtomicU32::new(0),
            ready_after: AtomicU32::new(0),
        }
    }

    /// Start powered off.
    #[must_use]
    pub fn disabled(self) -> Self {
        self.enabled.store(false, Ordering::SeqCst);
        self
    }

    /// Report no scanner for the first `polls` polls.
    #[must_use]
    pub fn ready_after_polls(self, polls: u32) -> Self {
        self.ready_after.store(polls, Ordering::SeqCst);
        self
    }

    /// The scanner this adapter hands out.
    pub fn mock_scanner(&self) -> &Arc<MockScanner> {
        &self.scanner
    }

    /// Number of `enable` calls.
    pub fn enable_calls(&self) -> u32 {
        self.enable_calls.load(Ordering::SeqCst)
    }

    /// Number of `scanner` polls.
    pub fn scanner_polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BleAdapter for MockAdapter {
    async fn is_enabled(&self) -> Result<bool> {
        Ok(self.enabled.load(Ordering::SeqCst))
    }

    async fn enable(&self) -> Result<()> {
        self.enable_calls.fetch_add(1, Ordering::SeqCst);
        self.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn scanner(&self) -> Result<Option<Arc<dyn BleScanner>>> {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst);
        if !self.enabled.load(Ordering::SeqCst) || polls < self.ready_after.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let scanner: Arc<dyn BleScanner> = self.scanner.clone();
        Ok(Some(scanner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bleacon_types::ScanMode;
    use bleacon_types::uuids::{BATTERY_LEVEL, BATTERY_SERVICE};

    #[test]
    fn test_mock_device_id_format() {
        let id = mock_device_id();
        assert!(id.starts_with("MOCK-"));
        assert_eq!(id.len(), 11);
    }

    #[tokio::test]
    async fn test_advertise_without_subscribers() {
        let mock = MockScanner::new();
        assert_eq!(mock.advertise(Advertisement::new("dev")), 0);
    }

    #[tokio::test]
    async fn test_advertisement_stream() {
        let mock = MockScanner::new();
        let mut stream = mock.advertisements().await.unwrap();

        assert_eq!(mock.advertise(Advertisement::new("dev-1")), 1);
        let adv = stream.next().await.unwrap();
        assert_eq!(adv.device_id, "dev-1");
    }

    #[tokio::test]
    async fn test_scan_calls_are_recorded() {
        let mock = MockScanner::new();
        let session = SessionId::next();
        mock.start_scan(session, &[BleFilter::manufacturer(1)], &ScanSettings::LOW_POWER)
            .await
            .unwrap();
        assert!(mock.is_scanning());
        mock.stop_scan(session).await.unwrap();
        assert!(!mock.is_scanning());

        let kinds: Vec<_> = mock.calls().iter().map(MockCall::kind).collect();
        assert_eq!(kinds, vec!["start", "stop"]);
    }

    #[tokio::test]
    async fn test_scan_runs_until_last_session_stops() {
        let mock = MockScanner::new();
        let (a, b) = (SessionId::next(), SessionId::next());
        mock.start_scan(a, &[BleFilter::manufacturer(1)], &ScanSettings::LOW_POWER)
            .await
            .unwrap();
        mock.start_scan(b, &[BleFilter::manufacturer(2)], &ScanSettings::new(ScanMode::LowLatency))
            .await
            .unwrap();
        assert_eq!(mock.live_sessions(), 2);

        // Unknown sessions are ignored
        mock.stop_scan(SessionId::next()).await.unwrap();
        mock.stop_scan(a).await.unwrap();
        assert!(mock.is_scanning());
        assert_eq!(mock.active_filters(), vec![BleFilter::manufacturer(2)]);

        mock.stop_scan(b).await.unwrap();
        assert!(!mock.is_scanning());
    }

    #[tokio::test]
    async fn test_connection_read_write() {
        let mock = MockScanner::new().with_characteristic(BATTERY_SERVICE, BATTERY_LEVEL, vec![50]);
        let conn = mock.connect("dev", false).await.unwrap();

        conn.discover(BATTERY_SERVICE, BATTERY_LEVEL).await.unwrap();
        assert_eq!(conn.read(BATTERY_LEVEL).await.unwrap(), vec![50]);

        conn.write(BATTERY_LEVEL, &[49]).await.unwrap();
        assert_eq!(conn.read(BATTERY_LEVEL).await.unwrap(), vec![49]);

        conn.disconnect().await.unwrap();
        assert!(matches!(conn.read(BATTERY_LEVEL).await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_discover_missing_service() {
        let mock = MockScanner::new();
        let conn = mock.connect("dev", false).await.unwrap();
        let err = conn.discover(BATTERY_SERVICE, BATTERY_LEVEL).await.unwrap_err();
        assert!(matches!(err, Error::ServiceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_notifications_are_filtered_by_characteristic() {
        let mock = MockScanner::new().with_characteristic(BATTERY_SERVICE, BATTERY_LEVEL, vec![50]);
        mock.connect("dev", false).await.unwrap();
        let conn = mock.connections().remove(0);

        let mut stream = conn.subscribe(BATTERY_LEVEL).await.unwrap();
        conn.notify(Uuid::nil(), vec![0]);
        conn.notify(BATTERY_LEVEL, vec![42]);

        assert_eq!(stream.next().await.unwrap(), vec![42]);
    }

    #[tokio::test]
    async fn test_failed_connect() {
        let mock = MockScanner::new();
        mock.set_fail_connect(true);
        assert!(matches!(
            mock.connect("dev", false).await,
            Err(Error::ConnectionFailed { .. })
        ));
        assert_eq!(mock.calls().len(), 1);
    }
}
