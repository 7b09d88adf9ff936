//! Scan and ibeacon command implementations.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use bleacon_core::{BeaconReport, BeaconScanner, ScanHandle};
use bleacon_types::{BeaconDeserializer, BleFilter, IBeaconDeserializer, RawPayload, ScanSettings};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cli::OutputFormat;
use crate::format::{
    FormatOptions, format_ibeacon_json, format_ibeacon_text, format_raw_json, format_raw_text,
};
use crate::style;
use crate::util::{acquire_scanner, wait_until_done};

/// Resolved options for one scanning run.
#[derive(Debug, Clone)]
pub struct ScanRun {
    /// Stop after this long (None runs until Ctrl-C).
    pub timeout: Option<Duration>,
    /// Limit on waiting for the scanner.
    pub acquire_timeout: Option<Duration>,
    pub settings: ScanSettings,
    /// Stop after the first report.
    pub once: bool,
    pub format: OutputFormat,
    pub quiet: bool,
}

/// Build the scan filter for a manufacturer with an optional data prefix and mask.
pub fn build_filter(
    manufacturer_id: u16,
    data: Option<Vec<u8>>,
    mask: Option<Vec<u8>>,
) -> Result<BleFilter> {
    let filter = BleFilter::manufacturer(manufacturer_id);
    match (data, mask) {
        (Some(data), Some(mask)) => filter
            .with_masked_data(data, mask)
            .context("Invalid --data/--mask combination"),
        (Some(data), None) => Ok(filter.with_data(data)),
        (None, _) => Ok(filter),
    }
}

pub async fn cmd_scan(
    manufacturer_id: u16,
    min_len: usize,
    filter: BleFilter,
    run: ScanRun,
    opts: FormatOptions,
) -> Result<()> {
    let format = run.format;
    run_beacon_scan(
        manufacturer_id,
        RawPayload::new(min_len),
        filter,
        run,
        opts,
        move |report| match format {
            OutputFormat::Text => Ok(format_raw_text(report, manufacturer_id, &opts)),
            OutputFormat::Json => format_raw_json(report, manufacturer_id, &opts),
        },
    )
    .await
}

pub async fn cmd_ibeacon(run: ScanRun, opts: FormatOptions) -> Result<()> {
    let format = run.format;
    run_beacon_scan(
        IBeaconDeserializer::MANUFACTURER_ID,
        IBeaconDeserializer,
        BleFilter::manufacturer(IBeaconDeserializer::MANUFACTURER_ID),
        run,
        opts,
        move |report| match format {
            OutputFormat::Text => Ok(format_ibeacon_text(report, &opts)),
            OutputFormat::Json => format_ibeacon_json(report, &opts),
        },
    )
    .await
}

async fn run_beacon_scan<D, R>(
    manufacturer_id: u16,
    deserializer: D,
    filter: BleFilter,
    run: ScanRun,
    opts: FormatOptions,
    render: R,
) -> Result<()>
where
    D: BeaconDeserializer + 'static,
    R: Fn(&BeaconReport<D::Output>) -> Result<String> + Send + Sync + 'static,
{
    let scanner = acquire_scanner(run.acquire_timeout, run.quiet).await?;

    let done = CancellationToken::new();
    let reports = Arc::new(AtomicUsize::new(0));

    let on_found = {
        let done = done.clone();
        let reports = Arc::clone(&reports);
        let once = run.once;
        move |handle: &ScanHandle, report: BeaconReport<D::Output>| {
            // Reports queued before the stop still arrive
            if once && reports.load(Ordering::SeqCst) > 0 {
                return;
            }
            match render(&report) {
                Ok(out) if !out.is_empty() => println!("{}", out),
                Ok(_) => {}
                Err(e) => warn!("Failed to format report: {}", e),
            }
            reports.fetch_add(1, Ordering::SeqCst);
            if once {
                handle.stop();
                done.cancel();
            }
        }
    };

    let beacons = BeaconScanner::builder(manufacturer_id, deserializer)
        .filter(filter)
        .settings(run.settings)
        .on_found(on_found)
        .build(scanner);

    if !run.quiet {
        eprintln!(
            "Scanning for manufacturer 0x{:04X} ({})... press Ctrl-C to stop",
            manufacturer_id, run.settings.mode
        );
    }

    beacons.start();
    wait_until_done(&done, run.timeout).await;
    beacons.stop();
    beacons.flush().await;

    if !run.quiet {
        let count = reports.load(Ordering::SeqCst);
        eprintln!(
            "{}",
            style::format_success(&format!("{} report(s) received", count), opts.no_color)
        );
    }
    Ok(())
}
