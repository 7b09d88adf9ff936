//! Utility functions for CLI operations.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bleacon_core::{AcquireOptions, BleScanner, BtleAdapter, obtain_scanner};
use bleacon_types::uuids::parse_uuid;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::style;

/// Parse a manufacturer ID given as decimal (`76`) or hex (`0x004C`).
pub fn parse_manufacturer_id(s: &str) -> Result<u16, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| {
        format!(
            "'{}' is not a valid manufacturer ID (expected 0-65535 or 0x0000-0xFFFF)",
            s
        )
    })
}

/// Parse a hex byte string. Accepts an optional `0x`/`0X` prefix and `:` or space separators.
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, String> {
    let s = s.trim();
    let digits: String = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
        .chars()
        .filter(|c| !matches!(c, ':' | ' '))
        .collect();

    if !digits.is_ascii() {
        return Err(format!("'{}' is not a valid hex string", s));
    }
    if digits.len() % 2 != 0 {
        return Err(format!("'{}' has an odd number of hex digits", s));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| format!("'{}' is not a valid hex string", s))
        })
        .collect()
}

/// Parse a service or characteristic UUID, full or 16/32-bit short form.
pub fn parse_uuid_arg(s: &str) -> Result<Uuid, String> {
    parse_uuid(s).map_err(|e| e.to_string())
}

/// Open the first adapter and wait for its scanner, with a spinner.
pub async fn acquire_scanner(timeout: Option<Duration>, quiet: bool) -> Result<Arc<dyn BleScanner>> {
    let adapter = BtleAdapter::first()
        .await
        .context("Failed to open Bluetooth adapter")?;

    let mut options = AcquireOptions::default();
    if let Some(timeout) = timeout {
        options = options.timeout(timeout);
    }

    let spinner = (!quiet).then(style::acquiring_spinner);
    let result = obtain_scanner(&adapter, &options).await;
    if let Some(sp) = spinner {
        sp.finish_and_clear();
    }

    result.context("Bluetooth scanner is not available. Is Bluetooth turned on?")
}

/// Wait until `done` is cancelled, `timeout` elapses or Ctrl-C is pressed.
pub async fn wait_until_done(done: &CancellationToken, timeout: Option<Duration>) {
    let deadline = async {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = done.cancelled() => {}
        _ = deadline => tracing::debug!("Timeout reached"),
        _ = tokio::signal::ctrl_c() => tracing::debug!("Interrupted"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manufacturer_id_decimal_and_hex() {
        assert_eq!(parse_manufacturer_id("76"), Ok(0x004C));
        assert_eq!(parse_manufacturer_id("0x004C"), Ok(0x004C));
        assert_eq!(parse_manufacturer_id("0XFFFF"), Ok(0xFFFF));
        assert_eq!(parse_manufacturer_id(" 89 "), Ok(0x0059));
    }

    #[test]
    fn test_parse_manufacturer_id_rejects_out_of_range() {
        let err = parse_manufacturer_id("65536").unwrap_err();
        assert!(err.contains("65536"));
        assert!(parse_manufacturer_id("0x10000").is_err());
        assert!(parse_manufacturer_id("apple").is_err());
        assert!(parse_manufacturer_id("").is_err());
    }

    #[test]
    fn test_parse_hex_bytes() {
        assert_eq!(parse_hex_bytes("beac"), Ok(vec![0xBE, 0xAC]));
        assert_eq!(parse_hex_bytes("0x0215"), Ok(vec![0x02, 0x15]));
        assert_eq!(parse_hex_bytes("0X0215"), Ok(vec![0x02, 0x15]));
        assert_eq!(parse_hex_bytes("02:15 ff"), Ok(vec![0x02, 0x15, 0xFF]));
        assert_eq!(parse_hex_bytes(""), Ok(vec![]));
    }

    #[test]
    fn test_parse_hex_bytes_errors() {
        assert!(parse_hex_bytes("abc").unwrap_err().contains("odd"));
        assert!(parse_hex_bytes("zz").is_err());
    }

    #[test]
    fn test_parse_uuid_arg() {
        assert_eq!(
            parse_uuid_arg("180f").unwrap(),
            bleacon_types::uuids::BATTERY_SERVICE
        );
        assert!(parse_uuid_arg("not-a-uuid").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_done_on_cancel() {
        let done = CancellationToken::new();
        done.cancel();
        wait_until_done(&done, None).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_done_on_timeout() {
        let done = CancellationToken::new();
        let started = tokio::time::Instant::now();
        wait_until_done(&done, Some(Duration::from_secs(3))).await;
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }
}
