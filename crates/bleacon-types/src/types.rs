//! Core types for BLE advertisement scanning.

use core::fmt;
use core::time::Duration;
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ParseError;

/// A single advertisement report, detached from the platform that produced it.
///
/// Advertisements are plain values: they live for as long as the callback that
/// receives them and carry no handle back into the Bluetooth stack.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Advertisement {
    /// Platform identifier of the advertiser (MAC address or CoreBluetooth UUID).
    pub device_id: String,
    /// Advertised local name, if any.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,
    /// Received signal strength in dBm.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub rssi: Option<i16>,
    /// Advertised transmit power level in dBm.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub tx_power: Option<i16>,
    /// Manufacturer-specific data keyed by 16-bit manufacturer ID.
    ///
    /// Payloads exclude the two ID bytes.
    pub manufacturer_data: BTreeMap<u16, Vec<u8>>,
    /// Advertised service UUIDs.
    #[cfg_attr(feature = "serde", serde(default))]
    pub services: Vec<Uuid>,
    /// When this report was received.
    pub received_at: time::OffsetDateTime,
}

impl Advertisement {
    /// Create an empty advertisement for a device, stamped with the current time.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            name: None,
            rssi: None,
            tx_power: None,
            manufacturer_data: BTreeMap::new(),
            services: Vec::new(),
            received_at: time::OffsetDateTime::now_utc(),
        }
    }

    /// Set the local name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the RSSI.
    #[must_use]
    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Add a manufacturer-specific payload.
    #[must_use]
    pub fn with_manufacturer_data(mut self, manufacturer_id: u16, data: impl Into<Vec<u8>>) -> Self {
        self.manufacturer_data.insert(manufacturer_id, data.into());
        self
    }

    /// Add an advertised service UUID.
    #[must_use]
    pub fn with_service(mut self, service: Uuid) -> Self {
        self.services.push(service);
        self
    }

    /// Get the manufacturer-specific payload for one manufacturer ID.
    ///
    /// ```
    /// use bleacon_types::Advertisement;
    ///
    /// let adv = Advertisement::new("AA:BB:CC:DD:EE:FF").with_manufacturer_data(0x004C, [1, 2]);
    /// assert_eq!(adv.manufacturer_payload(0x004C), Some(&[1u8, 2][..]));
    /// assert_eq!(adv.manufacturer_payload(0x0059), None);
    /// ```
    #[must_use]
    pub fn manufacturer_payload(&self, manufacturer_id: u16) -> Option<&[u8]> {
        self.manufacturer_data
            .get(&manufacturer_id)
            .map(Vec::as_slice)
    }
}

/// A scan filter: a manufacturer ID plus a byte-matching predicate.
///
/// The predicate compares the start of the manufacturer payload against
/// `data`, honoring `mask` when present. A mask bit of `1` means the
/// corresponding data bit must match; `0` means "don't care".
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BleFilter {
    manufacturer_id: u16,
    data: Vec<u8>,
    mask: Option<Vec<u8>>,
    service: Option<Uuid>,
    name: Option<String>,
}

impl BleFilter {
    /// Filter on a manufacturer ID alone.
    #[must_use]
    pub fn manufacturer(manufacturer_id: u16) -> Self {
        Self {
            manufacturer_id,
            data: Vec::new(),
            mask: None,
            service: None,
            name: None,
        }
    }

    /// Require the payload to start with `data`.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self.mask = None;
        self
    }

    /// Require the payload to match `data` under `mask`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidFilter`] if `mask` and `data` differ in length.
    pub fn with_masked_data(
        mut self,
        data: impl Into<Vec<u8>>,
        mask: impl Into<Vec<u8>>,
    ) -> Result<Self, ParseError> {
        let data = data.into();
        let mask = mask.into();
        if data.len() != mask.len() {
            return Err(ParseError::InvalidFilter(format!(
                "mask length {} does not match data length {}",
                mask.len(),
                data.len()
            )));
        }
        self.data = data;
        self.mask = Some(mask);
        Ok(self)
    }

    /// Also require an advertised service UUID.
    #[must_use]
    pub fn with_service(mut self, service: Uuid) -> Self {
        self.service = Some(service);
        self
    }

    /// Also require an exact local name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The manufacturer ID this filter selects.
    #[must_use]
    pub fn manufacturer_id(&self) -> u16 {
        self.manufacturer_id
    }

    /// The service UUID constraint, if any.
    #[must_use]
    pub fn service(&self) -> Option<Uuid> {
        self.service
    }

    /// Check whether a payload satisfies the byte predicate.
    #[must_use]
    pub fn matches_payload(&self, payload: &[u8]) -> bool {
        if payload.len() < self.data.len() {
            return false;
        }
        match &self.mask {
            Some(mask) => self
                .data
                .iter()
                .zip(mask)
                .zip(payload)
                .all(|((d, m), p)| d & m == p & m),
            None => payload.starts_with(&self.data),
        }
    }

    /// Check whether an advertisement passes this filter.
    #[must_use]
    pub fn matches(&self, advertisement: &Advertisement) -> bool {
        let Some(payload) = advertisement.manufacturer_payload(self.manufacturer_id) else {
            return false;
        };

        if !self.matches_payload(payload) {
            return false;
        }

        if let Some(service) = self.service
            && !advertisement.services.contains(&service)
        {
            return false;
        }

        match &self.name {
            Some(name) => advertisement.name.as_deref() == Some(name.as_str()),
            None => true,
        }
    }
}

/// Power/latency trade-off requested from the platform scanner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ScanMode {
    /// Scan in short windows with long gaps.
    #[default]
    LowPower,
    /// Middle ground between power and latency.
    Balanced,
    /// Scan continuously.
    LowLatency,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMode::LowPower => write!(f, "low-power"),
            ScanMode::Balanced => write!(f, "balanced"),
            ScanMode::LowLatency => write!(f, "low-latency"),
        }
    }
}

impl core::str::FromStr for ScanMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "low-power" => Ok(ScanMode::LowPower),
            "balanced" => Ok(ScanMode::Balanced),
            "low-latency" => Ok(ScanMode::LowLatency),
            other => Err(ParseError::InvalidValue(format!(
                "unknown scan mode '{other}' (expected low-power, balanced or low-latency)"
            ))),
        }
    }
}

/// Settings passed to the platform when a scan starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScanSettings {
    /// Requested scan mode.
    pub mode: ScanMode,
    /// Delay before batched results are reported. Zero reports immediately.
    #[cfg_attr(feature = "serde", serde(default))]
    pub report_delay: Duration,
}

impl ScanSettings {
    /// Low-power settings with immediate reporting.
    pub const LOW_POWER: Self = Self {
        mode: ScanMode::LowPower,
        report_delay: Duration::ZERO,
    };

    /// Create settings with the given mode.
    #[must_use]
    pub fn new(mode: ScanMode) -> Self {
        Self {
            mode,
            report_delay: Duration::ZERO,
        }
    }

    /// Set the batch report delay.
    #[must_use]
    pub fn report_delay(mut self, delay: Duration) -> Self {
        self.report_delay = delay;
        self
    }

    /// Whether results are delivered in batches.
    #[must_use]
    pub fn is_batched(&self) -> bool {
        !self.report_delay.is_zero()
    }
}
