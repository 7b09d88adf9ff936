//! Visual styling utilities for the CLI.
//!
//! Spinners for the adapter wait, signal bars and status prefixes.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

/// Standard spinner tick characters (Braille dots animation)
const SPINNER_TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Standard spinner tick interval
const SPINNER_TICK_MS: u64 = 80;

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner().tick_chars(SPINNER_TICK_CHARS);
    pb.set_style(match style.clone().template("{spinner:.cyan} {msg}") {
        Ok(templated) => templated,
        Err(_) => style,
    });
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
    pb
}

/// Spinner shown while waiting for the Bluetooth scanner.
pub fn acquiring_spinner() -> ProgressBar {
    spinner("Waiting for Bluetooth adapter...")
}

/// Spinner shown while scanning for a device to connect to.
pub fn searching_spinner(manufacturer_id: u16) -> ProgressBar {
    spinner(&format!(
        "Looking for a device from manufacturer 0x{:04X}...",
        manufacturer_id
    ))
}

/// Format RSSI as a visual signal bar.
/// RSSI typically ranges from -100 dBm (weak) to -30 dBm (strong).
pub fn format_signal_bar(rssi: Option<i16>, no_color: bool) -> String {
    let Some(rssi) = rssi else {
        return "N/A".to_string();
    };

    // -30 dBm = 10 blocks, -100 dBm = 0
    let filled = (((rssi + 100).clamp(0, 70) as f32 / 7.0).round() as usize).min(10);
    let bar = format!("{}{}", "█".repeat(filled), "░".repeat(10 - filled));

    if no_color {
        format!("{} {:>4}", bar, rssi)
    } else if filled >= 7 {
        format!("{} {:>4}", bar.green(), rssi)
    } else if filled >= 4 {
        format!("{} {:>4}", bar.yellow(), rssi)
    } else {
        format!("{} {:>4}", bar.red(), rssi)
    }
}

/// Format a success message.
pub fn format_success(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[OK] {}", message)
    } else {
        format!("{} {}", "[OK]".green(), message)
    }
}

/// Format a warning message.
pub fn format_warning(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[!!] {}", message)
    } else {
        format!("{} {}", "[!!]".yellow(), message)
    }
}
