//! Device identifier helpers.

use btleplug::platform::PeripheralId;

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms, they may be
/// MAC addresses or other formats. This function extracts the useful
/// identifier string.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Create an identifier string from an address and peripheral ID.
///
/// On macOS where addresses are 00:00:00:00:00:00, uses the peripheral ID.
/// On other platforms, uses the Bluetooth address.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    identifier_or_else(address, || format_peripheral_id(peripheral_id))
}

fn identifier_or_else(address: &str, fallback: impl FnOnce() -> String) -> String {
    if address == "00:00:00:00:00:00" {
        fallback()
    } else {
        address.to_string()
    }
}

/// Canonical form of a device identifier for comparisons.
///
/// Upper-cases and accepts `-` or `_` in place of `:` between address
/// octets, so `aa-bb-cc-dd-ee-ff` and `AA:BB:CC:DD:EE:FF` compare equal.
/// CoreBluetooth UUIDs are only upper-cased.
pub fn normalize_address(identifier: &str) -> String {
    let trimmed = identifier.trim();
    let octets: Vec<&str> = trimmed.split([':', '-', '_']).collect();
    let is_mac = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));

    if is_mac {
        octets.join(":").to_ascii_uppercase()
    } else {
        trimmed.to_ascii_uppercase()
    }
}
