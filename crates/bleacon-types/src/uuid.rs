//! Bluetooth UUIDs and manufacturer identifiers.
//!
//! Standard 16-bit and 32-bit UUIDs are aliases inside the Bluetooth base
//! UUID `0000xxxx-0000-1000-8000-00805f9b34fb`. The helpers here convert
//! between the short and full forms so callers can write `180f` instead of
//! the full 128-bit string.

use uuid::{Uuid, uuid};

use crate::error::{ParseError, ParseResult};

/// The Bluetooth base UUID.
pub const BASE_UUID: Uuid = uuid!("00000000-0000-1000-8000-00805f9b34fb");

// --- Manufacturer IDs ---

/// Apple, Inc. (iBeacon frames are carried under this ID).
pub const APPLE_MANUFACTURER_ID: u16 = 0x004C;

/// Nordic Semiconductor ASA.
pub const NORDIC_MANUFACTURER_ID: u16 = 0x0059;

/// Reserved ID for internal use and testing.
pub const TEST_MANUFACTURER_ID: u16 = 0xFFFF;

// --- Standard BLE Service UUIDs ---

/// Generic Access Profile (GAP) service.
pub const GAP_SERVICE: Uuid = uuid!("00001800-0000-1000-8000-00805f9b34fb");

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = uuid!("0000180a-0000-1000-8000-00805f9b34fb");

/// Battery service.
pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");

// --- Standard BLE Characteristic UUIDs ---

/// Device name characteristic.
pub const DEVICE_NAME: Uuid = uuid!("00002a00-0000-1000-8000-00805f9b34fb");

/// Manufacturer name string characteristic.
pub const MANUFACTURER_NAME: Uuid = uuid!("00002a29-0000-1000-8000-00805f9b34fb");

/// Battery level characteristic.
pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");

/// Expand a 16-bit or 32-bit assigned number into a full UUID.
///
/// ```
/// use bleacon_types::uuid::{from_short, BATTERY_SERVICE};
///
/// assert_eq!(from_short(0x180F), BATTERY_SERVICE);
/// ```
#[must_use]
pub const fn from_short(short: u32) -> Uuid {
    let base = BASE_UUID.as_u128();
    Uuid::from_u128(base | ((short as u128) << 96))
}

/// Return the 32-bit short form if the UUID lies in the Bluetooth base range.
#[must_use]
pub fn short_form(uuid: &Uuid) -> Option<u32> {
    let value = uuid.as_u128();
    let base = BASE_UUID.as_u128();
    if value & ((1u128 << 96) - 1) == base {
        Some((value >> 96) as u32)
    } else {
        None
    }
}

/// Parse a UUID from user input.
///
/// Accepts the full hyphenated form, a 4-digit (16-bit) short form or an
/// 8-digit (32-bit) short form, with or without a `0x` prefix.
pub fn parse_uuid(input: &str) -> ParseResult<Uuid> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if matches!(digits.len(), 4 | 8) && digits.chars().all(|c| c.is_ascii_hexdigit()) {
        let short = u32::from_str_radix(digits, 16)
            .map_err(|e| ParseError::InvalidValue(format!("invalid short UUID '{input}': {e}")))?;
        return Ok(from_short(short));
    }

    Uuid::parse_str(trimmed)
        .map_err(|e| ParseError::InvalidValue(format!("invalid UUID '{input}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_short_matches_standard_services() {
        assert_eq!(from_short(0x1800), GAP_SERVICE);
        assert_eq!(from_short(0x180A), DEVICE_INFO_SERVICE);
        assert_eq!(from_short(0x180F), BATTERY_SERVICE);
        assert_eq!(from_short(0x2A19), BATTERY_LEVEL);
    }

    #[test]
    fn test_short_form() {
        assert_eq!(short_form(&BATTERY_LEVEL), Some(0x2A19));
        assert_eq!(short_form(&BASE_UUID), Some(0));

        let custom = uuid!("f0cd1400-95da-4f4b-9ac8-aa55d312af0c");
        assert_eq!(short_form(&custom), None);
    }

    #[test]
    fn test_parse_uuid_short_forms() {
        assert_eq!(parse_uuid("180f").unwrap(), BATTERY_SERVICE);
        assert_eq!(parse_uuid("0x2A19").unwrap(), BATTERY_LEVEL);
        assert_eq!(parse_uuid("00002a00").unwrap(), DEVICE_NAME);
    }

    #[test]
    fn test_parse_uuid_full_form() {
        let parsed = parse_uuid("0000180a-0000-1000-8000-00805f9b34fb").unwrap();
        assert_eq!(parsed, DEVICE_INFO_SERVICE);
    }

    #[test]
    fn test_parse_uuid_rejects_garbage() {
        let err = parse_uuid("not-a-uuid").unwrap_err();
        assert!(err.to_string().contains("not-a-uuid"));
        assert!(parse_uuid("18z0").is_err());
    }

    #[test]
    fn test_manufacturer_ids() {
        assert_eq!(APPLE_MANUFACTURER_ID, 76);
        assert_ne!(APPLE_MANUFACTURER_ID, NORDIC_MANUFACTURER_ID);
    }
}
