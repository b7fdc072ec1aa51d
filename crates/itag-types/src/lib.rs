//! Platform-agnostic types for iTag BLE proximity tags.
//!
//! This crate provides shared types used by the native session
//! implementation in itag-core: UUID constants for the tag's GATT
//! profile, the characteristic role mapping, connection state, and
//! payload encoding/decoding.
//!
//! # Example
//!
//! ```
//! use itag_types::{CharacteristicRole, decode_u8, encode_alarm};
//! use itag_types::uuid::BATTERY_LEVEL;
//!
//! assert_eq!(
//!     CharacteristicRole::for_characteristic(BATTERY_LEVEL),
//!     Some(CharacteristicRole::Battery)
//! );
//! assert_eq!(decode_u8(&[75]).unwrap(), 75);
//! assert_eq!(encode_alarm(true), [0x02]);
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{
    CharacteristicRole, ConnectionState, decode_alarm, decode_battery, decode_u8, encode_alarm,
};
pub use self::uuid as uuids;
