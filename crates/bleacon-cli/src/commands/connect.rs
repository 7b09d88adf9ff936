//! Connect command implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bleacon_core::{
    BleFilter, Error, GattCallback, GattConnection, GattScanner, GattScannerOptions, GattTarget,
    ScanHandle,
};
use bleacon_types::ScanSettings;
use futures::StreamExt;
use indicatif::ProgressBar;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_value_json, format_value_text};
use crate::style;
use crate::util::{acquire_scanner, wait_until_done};

/// Arguments for the connect command.
#[derive(Debug, Clone)]
pub struct ConnectArgs {
    pub manufacturer_id: u16,
    pub service: Uuid,
    pub characteristic: Uuid,
    pub auto_connect: bool,
    /// Stream notifications after the first read.
    pub watch: bool,
    /// Overall limit (None runs until Ctrl-C).
    pub timeout: Option<Duration>,
    pub acquire_timeout: Option<Duration>,
    pub settings: ScanSettings,
    pub format: OutputFormat,
    pub quiet: bool,
}

struct PrintValue {
    format: OutputFormat,
    opts: FormatOptions,
    watch: bool,
    spinner: Option<ProgressBar>,
    printed: Arc<AtomicBool>,
    done: CancellationToken,
    failure: Arc<Mutex<Option<String>>>,
}

impl PrintValue {
    fn print(&self, device_id: &str, characteristic: Uuid, value: &[u8]) {
        if let Some(sp) = &self.spinner {
            sp.finish_and_clear();
        }
        self.printed.store(true, Ordering::SeqCst);
        let line = match self.format {
            OutputFormat::Text => Ok(format_value_text(device_id, characteristic, value, &self.opts)),
            OutputFormat::Json => format_value_json(device_id, characteristic, value, &self.opts),
        };
        match line {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to format value: {}", e),
        }
    }

    fn fail(&self, message: String) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(message);
        }
        self.done.cancel();
    }

    async fn stream_notifications(&self, connection: &dyn GattConnection, characteristic: Uuid) -> Result<(), Error> {
        let mut notifications = connection.subscribe(characteristic).await?;
        loop {
            tokio::select! {
                _ = self.done.cancelled() => break,
                next = notifications.next() => match next {
                    Some(value) => self.print(connection.device_id(), characteristic, &value),
                    None => {
                        debug!("Notification stream ended");
                        break;
                    }
                },
            }
        }
        Ok(())
    }
}

#[async_trait]
impl GattCallback for PrintValue {
    async fn on_connected(
        &self,
        _handle: &ScanHandle,
        connection: Arc<dyn GattConnection>,
        target: GattTarget,
    ) {
        let device_id = connection.device_id().to_string();

        match connection.read(target.characteristic).await {
            Ok(value) => self.print(&device_id, target.characteristic, &value),
            Err(e) => {
                self.fail(format!("Failed to read {}: {}", target.characteristic, e));
                let _ = connection.disconnect().await;
                return;
            }
        }

        if self.watch
            && let Err(e) = self.stream_notifications(connection.as_ref(), target.characteristic).await
        {
            self.fail(format!("Failed to subscribe to {}: {}", target.characteristic, e));
        }

        if let Err(e) = connection.disconnect().await {
            debug!("Disconnect reported an error: {}", e);
        }
        self.done.cancel();
    }

    fn on_error(&self, device_id: &str, error: &Error) {
        self.fail(format!("Failed to connect to {}: {}", device_id, error));
    }
}

pub async fn cmd_connect(args: ConnectArgs, opts: FormatOptions) -> Result<()> {
    let scanner = acquire_scanner(args.acquire_timeout, args.quiet).await?;

    let done = CancellationToken::new();
    let failure = Arc::new(Mutex::new(None));
    let printed = Arc::new(AtomicBool::new(false));
    let spinner = (!args.quiet).then(|| style::searching_spinner(args.manufacturer_id));
    let callback = PrintValue {
        format: args.format,
        opts,
        watch: args.watch,
        spinner: spinner.clone(),
        printed: Arc::clone(&printed),
        done: done.clone(),
        failure: Arc::clone(&failure),
    };

    let gatt = GattScanner::with_options(
        scanner,
        BleFilter::manufacturer(args.manufacturer_id),
        args.service,
        args.characteristic,
        callback,
        GattScannerOptions::new()
            .settings(args.settings)
            .auto_connect(args.auto_connect),
    );

    gatt.start();
    wait_until_done(&done, args.timeout).await;
    if let Some(sp) = spinner {
        sp.finish_and_clear();
    }

    // Also cancels an in-flight watch
    done.cancel();
    gatt.stop();
    gatt.flush().await;

    let failure = failure.lock().ok().and_then(|mut f| f.take());
    if let Some(message) = failure {
        return Err(anyhow!(message));
    }
    if !printed.load(Ordering::SeqCst) && !args.quiet {
        eprintln!(
            "{}",
            style::format_warning(
                &format!(
                    "No device from manufacturer 0x{:04X} exposed {}",
                    args.manufacturer_id, args.characteristic
                ),
                opts.no_color
            )
        );
    }
    Ok(())
}
