//! Single-threaded FIFO job queue.
//!
//! A [`Handler`] owns one worker task that runs posted jobs one at a time, in
//! the order they were posted. Scanner start/stop requests and beacon
//! callbacks all go through a handler, so a callback never runs concurrently
//! with another callback or with a start/stop of the same scanner.
//!
//! Posting is fire-and-forget: the poster never waits for the job and never
//! sees its outcome.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use bleacon_core::Handler;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let handler = Handler::new();
//! handler.post(async { println!("first") });
//! handler.post_delayed(Duration::from_millis(10), async { println!("later") });
//! handler.flush().await;
//! # }
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Handle to a FIFO job queue. Cloning shares the same queue.
#[derive(Debug, Clone)]
pub struct Handler {
    sender: mpsc::UnboundedSender<Job>,
    shutdown: CancellationToken,
}

impl Handler {
    /// Create a handler and spawn its worker on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let shutdown = CancellationToken::new();
        let worker_shutdown = shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = worker_shutdown.cancelled() => {
                        debug!("Handler shut down");
                        break;
                    }
                    job = receiver.recv() => match job {
                        Some(job) => {
                            // Isolate callback panics
                            if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                                warn!("Handler job panicked");
                            }
                        }
                        None => {
                            trace!("Handler queue closed");
                            break;
                        }
                    },
                }
            }
        });

        Self { sender, shutdown }
    }

    /// Queue a job. Returns `false` if the handler has shut down.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return false;
        }
        self.sender.send(Box::pin(job)).is_ok()
    }

    /// Queue a job after `delay` has elapsed.
    ///
    /// The job is appended to the queue when the delay expires, behind
    /// anything posted before that moment. Pending delayed jobs are dropped
    /// on [`shutdown`](Self::shutdown).
    pub fn post_delayed<F>(&self, delay: Duration, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return false;
        }

        let sender = self.sender.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    trace!("Dropping delayed job on shutdown");
                }
                _ = tokio::time::sleep(delay) => {
                    let _ = sender.send(Box::pin(job));
                }
            }
        });
        true
    }

    /// Wait until every job posted before this call has run.
    ///
    /// Returns immediately if the handler has shut down.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.post(async move {
            let _ = tx.send(());
        }) {
            let _ = rx.await;
        }
    }

    /// Stop the worker. Queued and delayed jobs that have not started are dropped.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Default for Handler {
    fn default() -> Self {
        Self::new()
    }
}
