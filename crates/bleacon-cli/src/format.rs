//! Output formatting for text and JSON output.
//!
//! Scans print one line (text) or one JSON object (json) per report so the
//! output can be piped into line-oriented tools.

use anyhow::Result;
use bleacon_core::BeaconReport;
use bleacon_types::{Advertisement, IBeacon, RawBeacon};
use owo_colors::OwoColorize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::style;

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool) -> Self {
        Self { no_color }
    }

    /// Serialize value to a single JSON line.
    pub fn as_json_line<T: Serialize>(&self, value: &T) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn device(&self, advertisement: &Advertisement) -> String {
        let label = match &advertisement.name {
            Some(name) => format!("{} ({})", advertisement.device_id, name),
            None => advertisement.device_id.clone(),
        };
        if self.no_color {
            label
        } else {
            label.bold().to_string()
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.unix_timestamp().to_string())
}

fn clock(at: OffsetDateTime) -> String {
    format!("{:02}:{:02}:{:02}", at.hour(), at.minute(), at.second())
}

/// Advertisement fields included in every JSON report.
#[derive(Debug, Serialize)]
struct SourceJson<'a> {
    device_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rssi: Option<i16>,
    received_at: String,
}

impl<'a> From<&'a Advertisement> for SourceJson<'a> {
    fn from(adv: &'a Advertisement) -> Self {
        Self {
            device_id: &adv.device_id,
            name: adv.name.as_deref(),
            rssi: adv.rssi,
            received_at: rfc3339(adv.received_at),
        }
    }
}

#[derive(Debug, Serialize)]
struct RawReportJson<'a> {
    #[serde(flatten)]
    source: SourceJson<'a>,
    manufacturer_id: u16,
    payload: String,
}

#[derive(Debug, Serialize)]
struct IBeaconJson<'a> {
    #[serde(flatten)]
    source: SourceJson<'a>,
    #[serde(flatten)]
    beacon: &'a IBeacon,
    #[serde(skip_serializing_if = "Option::is_none")]
    distance_m: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ValueJson<'a> {
    device_id: &'a str,
    characteristic: Uuid,
    value: String,
    at: String,
}

/// Format a raw payload report as text lines.
pub fn format_raw_text(
    report: &BeaconReport<RawBeacon>,
    manufacturer_id: u16,
    opts: &FormatOptions,
) -> String {
    let adv = &report.advertisement;
    report
        .records
        .iter()
        .map(|record| {
            format!(
                "{} {} 0x{:04X} {} [{}]",
                clock(adv.received_at),
                opts.device(adv),
                manufacturer_id,
                record.hex(),
                style::format_signal_bar(adv.rssi, opts.no_color),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format a raw payload report as JSON lines.
pub fn format_raw_json(
    report: &BeaconReport<RawBeacon>,
    manufacturer_id: u16,
    opts: &FormatOptions,
) -> Result<String> {
    let lines = report
        .records
        .iter()
        .map(|record| {
            opts.as_json_line(&RawReportJson {
                source: SourceJson::from(&report.advertisement),
                manufacturer_id,
                payload: record.hex(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(lines.join("\n"))
}

/// Format an iBeacon report as text lines.
pub fn format_ibeacon_text(report: &BeaconReport<IBeacon>, opts: &FormatOptions) -> String {
    let adv = &report.advertisement;
    report
        .records
        .iter()
        .map(|beacon| {
            let distance = adv
                .rssi
                .map(|rssi| format!(" ~{:.1}m", beacon.estimate_distance(rssi)))
                .unwrap_or_default();
            format!(
                "{} {} {} major={} minor={} tx={}dBm [{}]{}",
                clock(adv.received_at),
                opts.device(adv),
                beacon.uuid,
                beacon.major,
                beacon.minor,
                beacon.tx_power,
                style::format_signal_bar(adv.rssi, opts.no_color),
                distance,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format an iBeacon report as JSON lines.
pub fn format_ibeacon_json(report: &BeaconReport<IBeacon>, opts: &FormatOptions) -> Result<String> {
    let adv = &report.advertisement;
    let lines = report
        .records
        .iter()
        .map(|beacon| {
            opts.as_json_line(&IBeaconJson {
                source: SourceJson::from(adv),
                beacon,
                distance_m: adv.rssi.map(|rssi| beacon.estimate_distance(rssi)),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(lines.join("\n"))
}

/// Format a characteristic value as text.
pub fn format_value_text(
    device_id: &str,
    characteristic: Uuid,
    value: &[u8],
    opts: &FormatOptions,
) -> String {
    let printable = std::str::from_utf8(value)
        .ok()
        .filter(|s| !s.is_empty() && s.chars().all(|c| !c.is_control()))
        .map(|s| format!(" \"{}\"", s))
        .unwrap_or_default();
    let line = format!("{} {} = {}{}", device_id, characteristic, hex(value), printable);
    if opts.no_color {
        line
    } else {
        format!("{} {}", clock(OffsetDateTime::now_utc()).dimmed(), line)
    }
}

/// Format a characteristic value as a JSON line.
pub fn format_value_json(
    device_id: &str,
    characteristic: Uuid,
    value: &[u8],
    opts: &FormatOptions,
) -> Result<String> {
    opts.as_json_line(&ValueJson {
        device_id,
        characteristic,
        value: hex(value),
        at: rfc3339(OffsetDateTime::now_utc()),
    })
}
