//! Beacon payload deserialization.
//!
//! A [`BeaconDeserializer`] turns the manufacturer-specific bytes of one
//! advertisement into zero or more typed records. Scanners check the payload
//! against [`BeaconDeserializer::required_len`] before calling
//! [`BeaconDeserializer::deserialize`], so implementations may index into the
//! first `required_len()` bytes without further checks.

use bytes::Buf;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ParseError, ParseResult};
use crate::uuid::APPLE_MANUFACTURER_ID;

/// Converts a manufacturer payload into typed beacon records.
pub trait BeaconDeserializer: Send + Sync {
    /// The record type produced from a payload.
    type Output: Send + 'static;

    /// Minimum payload length. Shorter payloads are never passed to
    /// [`deserialize`](Self::deserialize).
    fn required_len(&self) -> usize;

    /// Deserialize a payload of at least `required_len()` bytes.
    fn deserialize(&self, payload: &[u8]) -> ParseResult<Vec<Self::Output>>;

    /// Length-check then deserialize.
    ///
    /// Returns `None` when the payload is too short; the deserializer is not
    /// invoked in that case.
    fn try_deserialize(&self, payload: &[u8]) -> Option<ParseResult<Vec<Self::Output>>> {
        if payload.len() < self.required_len() {
            None
        } else {
            Some(self.deserialize(payload))
        }
    }
}

/// A deserializer backed by a closure.
///
/// Created with [`from_fn`].
pub struct FnDeserializer<F> {
    required_len: usize,
    f: F,
}

impl<F> std::fmt::Debug for FnDeserializer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnDeserializer")
            .field("required_len", &self.required_len)
            .finish_non_exhaustive()
    }
}

/// Wrap a closure as a [`BeaconDeserializer`].
///
/// ```
/// use bleacon_types::beacon::{from_fn, BeaconDeserializer};
///
/// let temps = from_fn(2, |payload: &[u8]| Ok(vec![i16::from_le_bytes([payload[0], payload[1]])]));
/// assert_eq!(temps.try_deserialize(&[0x10, 0x00]).unwrap().unwrap(), vec![16]);
/// assert!(temps.try_deserialize(&[0x10]).is_none());
/// ```
pub fn from_fn<T, F>(required_len: usize, f: F) -> FnDeserializer<F>
where
    T: Send + 'static,
    F: Fn(&[u8]) -> ParseResult<Vec<T>> + Send + Sync,
{
    FnDeserializer { required_len, f }
}

impl<T, F> BeaconDeserializer for FnDeserializer<F>
where
    T: Send + 'static,
    F: Fn(&[u8]) -> ParseResult<Vec<T>> + Send + Sync,
{
    type Output = T;

    fn required_len(&self) -> usize {
        self.required_len
    }

    fn deserialize(&self, payload: &[u8]) -> ParseResult<Vec<T>> {
        (self.f)(payload)
    }
}

/// An undecoded manufacturer payload.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawBeacon {
    /// The payload bytes, excluding the manufacturer ID.
    pub payload: Vec<u8>,
}

impl RawBeacon {
    /// Hex rendering of the payload.
    #[must_use]
    pub fn hex(&self) -> String {
        self.payload.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Passes payloads through unchanged once they reach a minimum length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawPayload {
    /// Minimum payload length to report.
    pub min_len: usize,
}

impl RawPayload {
    /// Create a raw deserializer with a minimum length.
    #[must_use]
    pub fn new(min_len: usize) -> Self {
        Self { min_len }
    }
}

impl BeaconDeserializer for RawPayload {
    type Output = RawBeacon;

    fn required_len(&self) -> usize {
        self.min_len
    }

    fn deserialize(&self, payload: &[u8]) -> ParseResult<Vec<RawBeacon>> {
        Ok(vec![RawBeacon {
            payload: payload.to_vec(),
        }])
    }
}

/// iBeacon frame type byte.
pub const IBEACON_TYPE: u8 = 0x02;

/// iBeacon frame length byte (bytes following the header).
pub const IBEACON_DATA_LEN: u8 = 0x15;

/// Total iBeacon manufacturer payload length.
pub const IBEACON_FRAME_LEN: usize = 23;

/// A decoded iBeacon frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IBeacon {
    /// Proximity UUID.
    pub uuid: Uuid,
    /// Major value.
    pub major: u16,
    /// Minor value.
    pub minor: u16,
    /// Calibrated RSSI at one meter, in dBm.
    pub tx_power: i8,
}

impl IBeacon {
    /// Parse an iBeacon manufacturer payload.
    ///
    /// Format (23 bytes, Apple manufacturer ID stripped):
    /// - byte 0: type (0x02)
    /// - byte 1: length (0x15)
    /// - bytes 2-17: proximity UUID
    /// - bytes 18-19: major (u16 BE)
    /// - bytes 20-21: minor (u16 BE)
    /// - byte 22: measured power (i8)
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] for short input and
    /// [`ParseError::InvalidValue`] for a wrong frame header.
    pub fn from_bytes(data: &[u8]) -> ParseResult<Self> {
        if data.len() < IBEACON_FRAME_LEN {
            return Err(ParseError::insufficient(IBEACON_FRAME_LEN, data.len()));
        }

        let mut buf = data;
        let frame_type = buf.get_u8();
        let frame_len = buf.get_u8();
        if frame_type != IBEACON_TYPE || frame_len != IBEACON_DATA_LEN {
            return Err(ParseError::InvalidValue(format!(
                "not an iBeacon frame (header 0x{frame_type:02X} 0x{frame_len:02X})"
            )));
        }

        let mut uuid_bytes = [0u8; 16];
        buf.copy_to_slice(&mut uuid_bytes);

        Ok(Self {
            uuid: Uuid::from_bytes(uuid_bytes),
            major: buf.get_u16(),
            minor: buf.get_u16(),
            tx_power: buf.get_i8(),
        })
    }

    /// Rough distance estimate in meters from an observed RSSI.
    ///
    /// Uses the log-distance path loss model with an exponent of 2.
    #[must_use]
    pub fn estimate_distance(&self, rssi: i16) -> f64 {
        let ratio_db = f64::from(self.tx_power) - f64::from(rssi);
        10f64.powf(ratio_db / 20.0)
    }
}

/// Decodes iBeacon frames carried under the Apple manufacturer ID.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IBeaconDeserializer;

impl IBeaconDeserializer {
    /// The manufacturer ID iBeacon frames are advertised under.
    pub const MANUFACTURER_ID: u16 = APPLE_MANUFACTURER_ID;
}

impl BeaconDeserializer for IBeaconDeserializer {
    type Output = IBeacon;

    fn required_len(&self) -> usize {
        IBEACON_FRAME_LEN
    }

    fn deserialize(&self, payload: &[u8]) -> ParseResult<Vec<IBeacon>> {
        IBeacon::from_bytes(payload).map(|beacon| vec![beacon])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PROXIMITY: Uuid = uuid::uuid!("e2c56db5-dffb-48d2-b060-d0f5a71096e0");

    fn ibeacon_frame() -> Vec<u8> {
        let mut frame = vec![IBEACON_TYPE, IBEACON_DATA_LEN];
        frame.extend_from_slice(PROXIMITY.as_bytes());
        frame.extend_from_slice(&[0x00, 0x01]); // major = 1
        frame.extend_from_slice(&[0x01, 0x02]); // minor = 258
        frame.push(0xC5); // -59 dBm
        frame
    }

    #[test]
    fn test_parse_ibeacon() {
        let beacon = IBeacon::from_bytes(&ibeacon_frame()).unwrap();
        assert_eq!(beacon.uuid, PROXIMITY);
        assert_eq!(beacon.major, 1);
        assert_eq!(beacon.minor, 258);
        assert_eq!(beacon.tx_power, -59);
    }

    #[test]
    fn test_parse_ibeacon_short() {
        let frame = ibeacon_frame();
        let err = IBeacon::from_bytes(&frame[..10]).unwrap_err();
        assert!(matches!(
            err,
            ParseError::InsufficientBytes {
                expected: 23,
                actual: 10
            }
        ));
    }

    #[test]
    fn test_parse_ibeacon_wrong_header() {
        let mut frame = ibeacon_frame();
        frame[0] = 0x03;
        let err = IBeacon::from_bytes(&frame).unwrap_err();
        assert!(err.to_string().contains("not an iBeacon frame"));
    }

    #[test]
    fn test_ibeacon_distance_at_reference_power() {
        let beacon = IBeacon::from_bytes(&ibeacon_frame()).unwrap();
        assert!((beacon.estimate_distance(-59) - 1.0).abs() < 1e-9);
        assert!(beacon.estimate_distance(-79) > 9.0);
    }

    #[test]
    fn test_ibeacon_deserializer_required_len() {
        let de = IBeaconDeserializer;
        assert_eq!(de.required_len(), IBEACON_FRAME_LEN);
        assert!(de.try_deserialize(&ibeacon_frame()[..22]).is_none());

        let records = de.try_deserialize(&ibeacon_frame()).unwrap().unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_raw_payload() {
        let de = RawPayload::new(2);
        assert!(de.try_deserialize(&[0xAB]).is_none());

        let records = de.try_deserialize(&[0xAB, 0xCD]).unwrap().unwrap();
        assert_eq!(records[0].hex(), "abcd");
    }

    #[test]
    fn test_short_payload_never_reaches_closure() {
        let calls = AtomicUsize::new(0);
        let de = from_fn(4, |payload: &[u8]| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![payload.len()])
        });

        assert!(de.try_deserialize(&[1, 2, 3]).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(de.try_deserialize(&[1, 2, 3, 4, 5]).unwrap().unwrap(), vec![5]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
