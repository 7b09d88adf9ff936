//! Scan session plumbing shared by the scanner front ends.
//!
//! A session is the span between a start and the next stop. While a session
//! is live, a pump task reads the platform's advertisement stream, applies
//! the session filters and posts each surviving report to the scanner's
//! [`Handler`], where an [`AdvertisementSink`] consumes it.
//!
//! The pump only holds a weak reference to its scanner. Once the last
//! scanner value and [`ScanHandle`] are dropped, the session ends and its
//! platform scan session is stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bleacon_types::{Advertisement, BleFilter, ScanSettings};

use crate::handler::Handler;
use crate::platform::{AdvertisementStream, BleScanner, SessionId};

/// Consumer of the advertisements a session delivers.
///
/// Sinks run on the scanner's handler, one report at a time.
pub(crate) trait AdvertisementSink: Send + Sync + 'static {
    /// Called on the handler when a new session starts.
    fn on_session_start(&self) {}

    /// Called for each advertisement that passed the session filters.
    fn on_advertisement(&self, handle: &ScanHandle, advertisement: Advertisement);

    /// Called with the reports collected over one batch window.
    fn on_batch(&self, handle: &ScanHandle, advertisements: Vec<Advertisement>) {
        for advertisement in advertisements {
            self.on_advertisement(handle, advertisement);
        }
    }
}

struct SessionCore {
    id: SessionId,
    scanner: Arc<dyn BleScanner>,
    handler: Handler,
    filters: Vec<BleFilter>,
    settings: ScanSettings,
    sink: Arc<dyn AdvertisementSink>,
    scanning: AtomicBool,
    session: Mutex<Option<CancellationToken>>,
}

/// Cheap, cloneable control handle for a scanner.
///
/// Found-callbacks receive one so they can stop or pause the scanner that
/// reported to them.
#[derive(Clone)]
pub struct ScanHandle {
    core: Arc<SessionCore>,
}

impl std::fmt::Debug for ScanHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanHandle")
            .field("session", &self.core.id)
            .field("filters", &self.core.filters)
            .field("settings", &self.core.settings)
            .field("scanning", &self.is_scanning())
            .finish()
    }
}

impl ScanHandle {
    pub(crate) fn new(
        scanner: Arc<dyn BleScanner>,
        handler: Handler,
        filters: Vec<BleFilter>,
        settings: ScanSettings,
        sink: Arc<dyn AdvertisementSink>,
    ) -> Self {
        Self {
            core: Arc::new(SessionCore {
                id: SessionId::next(),
                scanner,
                handler,
                filters,
                settings,
                sink,
                scanning: AtomicBool::new(false),
                session: Mutex::new(None),
            }),
        }
    }

    /// Post a start request. Starting a running scanner is a no-op.
    pub fn start(&self) {
        let handle = self.clone();
        self.core.handler.post(async move { handle.run_start().await });
    }

    /// Post a stop request.
    ///
    /// Safe to call any number of times, with or without a prior start.
    pub fn stop(&self) {
        let handle = self.clone();
        self.core.handler.post(async move { handle.run_stop().await });
    }

    /// Stop now and start again after `duration`.
    pub fn pause(&self, duration: Duration) {
        debug!(?duration, "Pausing scan");
        self.stop();
        let handle = self.clone();
        self.core
            .handler
            .post_delayed(duration, async move { handle.run_start().await });
    }

    /// Whether a scan session is live.
    pub fn is_scanning(&self) -> bool {
        self.core.scanning.load(Ordering::SeqCst)
    }

    /// The handler this scanner posts to.
    pub fn handler(&self) -> &Handler {
        &self.core.handler
    }

    /// The platform scanner.
    pub fn scanner(&self) -> &Arc<dyn BleScanner> {
        &self.core.scanner
    }

    async fn run_start(&self) {
        if self.is_scanning() {
            debug!("Scan already running");
            return;
        }

        // Subscribe before starting so the first reports are not lost
        let stream = match self.core.scanner.advertisements().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to subscribe to advertisements: {}", e);
                return;
            }
        };

        if let Err(e) = self
            .core
            .scanner
            .start_scan(self.core.id, &self.core.filters, &self.core.settings)
            .await
        {
            warn!("Failed to start scan: {}", e);
            return;
        }

        let token = CancellationToken::new();
        if let Ok(mut session) = self.core.session.lock() {
            *session = Some(token.clone());
        }
        self.core.scanning.store(true, Ordering::SeqCst);
        self.core.sink.on_session_start();

        info!(
            session = %self.core.id,
            filters = self.core.filters.len(),
            mode = %self.core.settings.mode,
            "Scan started"
        );

        let core = Arc::downgrade(&self.core);
        tokio::spawn(pump(core, stream, token));
    }

    async fn run_stop(&self) {
        let token = self
            .core
            .session
            .lock()
            .ok()
            .and_then(|mut session| session.take());
        if let Some(token) = token {
            token.cancel();
        }

        let was_scanning = self.core.scanning.swap(false, Ordering::SeqCst);
        if let Err(e) = self.core.scanner.stop_scan(self.core.id).await {
            debug!("Stop scan reported an error: {}", e);
        }
        if was_scanning {
            info!(session = %self.core.id, "Scan stopped");
        }
    }

    fn passes_filters(&self, advertisement: &Advertisement) -> bool {
        self.core.filters.is_empty()
            || self.core.filters.iter().any(|f| f.matches(advertisement))
    }

    fn deliver(&self, advertisement: Advertisement, token: &CancellationToken) {
        let handle = self.clone();
        let token = token.clone();
        self.core.handler.post(async move {
            // Reports that raced a stop are dropped
            if !token.is_cancelled() {
                handle.core.sink.on_advertisement(&handle, advertisement);
            }
        });
    }

    fn deliver_batch(&self, advertisements: Vec<Advertisement>, token: &CancellationToken) {
        let handle = self.clone();
        let token = token.clone();
        self.core.handler.post(async move {
            if !token.is_cancelled() {
                handle.core.sink.on_batch(&handle, advertisements);
            }
        });
    }
}

impl Drop for SessionCore {
    fn drop(&mut self) {
        if let Some(token) = self.session.get_mut().ok().and_then(Option::take) {
            token.cancel();
        }
        if !self.scanning.swap(false, Ordering::SeqCst) {
            return;
        }

        debug!(session = %self.id, "Scanner dropped while scanning");
        let scanner = Arc::clone(&self.scanner);
        let id = self.id;
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = scanner.stop_scan(id).await {
                    debug!("Stop scan reported an error: {}", e);
                }
            });
        }
    }
}

/// Read the advertisement stream until the session is cancelled, the stream
/// ends or the scanner is gone.
async fn pump(weak: Weak<SessionCore>, mut stream: AdvertisementStream, token: CancellationToken) {
    let Some(batch_window) = weak.upgrade().map(|core| core.settings.report_delay) else {
        return;
    };
    let mut batch = Vec::new();
    let mut deadline = tokio::time::Instant::now() + batch_window;

    loop {
        let next = if batch_window.is_zero() {
            tokio::select! {
                _ = token.cancelled() => break,
                next = stream.next() => next,
            }
        } else {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep_until(deadline) => {
                    deadline = tokio::time::Instant::now() + batch_window;
                    if !batch.is_empty() {
                        let Some(core) = weak.upgrade() else { break };
                        ScanHandle { core }.deliver_batch(std::mem::take(&mut batch), &token);
                    }
                    continue;
                }
                next = stream.next() => next,
            }
        };

        let Some(advertisement) = next else {
            debug!("Advertisement stream ended");
            break;
        };

        let Some(core) = weak.upgrade() else {
            debug!("Scanner dropped, ending session");
            break;
        };
        let handle = ScanHandle { core };
        if !handle.passes_filters(&advertisement) {
            continue;
        }

        if batch_window.is_zero() {
            handle.deliver(advertisement, &token);
        } else {
            batch.push(advertisement);
        }
    }
}
