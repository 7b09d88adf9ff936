//! Obtaining a scanner from an adapter.
//!
//! Adapters hand out a scanner only once the radio is powered. Right after
//! power-on there is a short window where the adapter reports enabled but
//! has no scanner yet, so [`obtain_scanner`] polls until one appears.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::platform::{BleAdapter, BleScanner};

/// Default interval between availability polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Options for [`obtain_scanner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireOptions {
    /// Delay between polls.
    pub poll_interval: Duration,
    /// Give up after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }
}

impl AcquireOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the poll interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Bound the wait.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Enable the adapter if needed, then poll until it provides a scanner.
///
/// # Errors
///
/// Returns [`Error::Timeout`] if `options.timeout` elapses first, or any
/// error the adapter reports while being queried.
pub async fn obtain_scanner<A>(adapter: &A, options: &AcquireOptions) -> Result<Arc<dyn BleScanner>>
where
    A: BleAdapter + ?Sized,
{
    if !adapter.is_enabled().await? {
        info!("Bluetooth adapter is off, requesting enable");
        adapter.enable().await?;
    }

    let started = Instant::now();
    let mut polls: u32 = 0;

    loop {
        if let Some(scanner) = adapter.scanner().await? {
            info!(polls, "Scanner acquired");
            return Ok(scanner);
        }

        polls += 1;
        if let Some(limit) = options.timeout
            && started.elapsed() >= limit
        {
            return Err(Error::timeout("acquire scanner", limit));
        }

        debug!(polls, "Scanner not available yet");
        sleep(options.poll_interval).await;
    }
}
