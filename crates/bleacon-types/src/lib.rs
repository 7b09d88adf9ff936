//! Platform-agnostic types for BLE beacon scanning.
//!
//! This crate provides the value types shared by the scanner runtime
//! (bleacon-core) and its front ends. It has no Bluetooth dependency.
//!
//! # Features
//!
//! - [`Advertisement`]: a detached advertisement report
//! - [`BleFilter`]: manufacturer ID plus byte-matching predicate
//! - [`ScanSettings`] and [`ScanMode`]
//! - [`BeaconDeserializer`] and the built-in [`IBeaconDeserializer`] and [`RawPayload`]
//! - UUID helpers for 16-bit and 32-bit short forms
//!
//! # Example
//!
//! ```
//! use bleacon_types::{Advertisement, BleFilter, BeaconDeserializer, RawPayload};
//!
//! let adv = Advertisement::new("AA:BB:CC:DD:EE:FF").with_manufacturer_data(0x0059, [0xBE, 0xAC, 7]);
//! let filter = BleFilter::manufacturer(0x0059).with_data([0xBE, 0xAC]);
//! assert!(filter.matches(&adv));
//!
//! let payload = adv.manufacturer_payload(0x0059).unwrap();
//! let records = RawPayload::new(3).try_deserialize(payload).unwrap().unwrap();
//! assert_eq!(records[0].payload, vec![0xBE, 0xAC, 7]);
//! ```

pub mod beacon;
pub mod error;
pub mod types;
pub mod uuid;

pub use beacon::{
    BeaconDeserializer, FnDeserializer, IBeacon, IBeaconDeserializer, RawBeacon, RawPayload,
    from_fn,
};
pub use error::{ParseError, ParseResult};
pub use types::{Advertisement, BleFilter, ScanMode, ScanSettings};
pub use self::uuid as uuids;
