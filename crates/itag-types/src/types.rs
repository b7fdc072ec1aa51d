//! Core types for iTag proximity tags.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use uuid::Uuid;

use crate::error::ParseError;
use crate::uuid::{
    ALERT_LEVEL, ALERT_LEVEL_HIGH, ALERT_LEVEL_OFF, BATTERY_LEVEL, BATTERY_SERVICE,
    BUTTON_CLICKED, BUTTON_SERVICE, IMMEDIATE_ALERT_SERVICE,
};

/// Logical role of a discovered characteristic.
///
/// A session is Ready once a handle has been recorded for every role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CharacteristicRole {
    /// Button-clicked characteristic; notifies the physical press code.
    Button,
    /// Alert Level characteristic; single-byte alarm control.
    Alarm,
    /// Battery Level characteristic; percentage byte.
    Battery,
}

impl CharacteristicRole {
    /// All roles, in discovery-completeness check order.
    pub const ALL: [CharacteristicRole; 3] = [
        CharacteristicRole::Button,
        CharacteristicRole::Alarm,
        CharacteristicRole::Battery,
    ];

    /// Map a characteristic UUID to its role, if it has one.
    #[must_use]
    pub fn for_characteristic(uuid: Uuid) -> Option<Self> {
        match uuid {
            u if u == BUTTON_CLICKED => Some(CharacteristicRole::Button),
            u if u == ALERT_LEVEL => Some(CharacteristicRole::Alarm),
            u if u == BATTERY_LEVEL => Some(CharacteristicRole::Battery),
            _ => None,
        }
    }

    /// Map a service UUID to the role its designated characteristic serves.
    #[must_use]
    pub fn for_service(uuid: Uuid) -> Option<Self> {
        match uuid {
            u if u == BUTTON_SERVICE => Some(CharacteristicRole::Button),
            u if u == IMMEDIATE_ALERT_SERVICE => Some(CharacteristicRole::Alarm),
            u if u == BATTERY_SERVICE => Some(CharacteristicRole::Battery),
            _ => None,
        }
    }

    /// The service this role's characteristic lives under.
    #[must_use]
    pub fn service(&self) -> Uuid {
        match self {
            CharacteristicRole::Button => BUTTON_SERVICE,
            CharacteristicRole::Alarm => IMMEDIATE_ALERT_SERVICE,
            CharacteristicRole::Battery => BATTERY_SERVICE,
        }
    }

    /// The designated characteristic for this role.
    #[must_use]
    pub fn characteristic(&self) -> Uuid {
        match self {
            CharacteristicRole::Button => BUTTON_CLICKED,
            CharacteristicRole::Alarm => ALERT_LEVEL,
            CharacteristicRole::Battery => BATTERY_LEVEL,
        }
    }
}

impl fmt::Display for CharacteristicRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharacteristicRole::Button => write!(f, "button"),
            CharacteristicRole::Alarm => write!(f, "alarm"),
            CharacteristicRole::Battery => write!(f, "battery"),
        }
    }
}

/// Connection state of a tag session.
///
/// Transitions: `Disconnected → Connected → Ready`, with any state
/// falling back to `Disconnected` on a transport disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConnectionState {
    /// No link; commands fail or are dropped.
    #[default]
    Disconnected,
    /// Link established, discovery in progress.
    Connected,
    /// All characteristic handles recorded; commands accepted.
    Ready,
}

impl ConnectionState {
    /// Whether the session accepts commands and polls signal strength.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Ready)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Ready => write!(f, "ready"),
        }
    }
}

/// Decode a single-byte payload (button press code, battery percentage).
pub fn decode_u8(data: &[u8]) -> Result<u8, ParseError> {
    match data.first() {
        Some(&b) => Ok(b),
        None => Err(ParseError::InsufficientBytes {
            expected: 1,
            actual: 0,
        }),
    }
}

/// Decode a Battery Level payload; valid percentages are 0-100.
pub fn decode_battery(data: &[u8]) -> Result<u8, ParseError> {
    let level = decode_u8(data)?;
    if level > 100 {
        return Err(ParseError::InvalidValue(format!(
            "battery percentage {level} out of range"
        )));
    }
    Ok(level)
}

/// Encode an alarm state as an Alert Level write payload.
#[must_use]
pub fn encode_alarm(enabled: bool) -> [u8; 1] {
    if enabled { [ALERT_LEVEL_HIGH] } else { [ALERT_LEVEL_OFF] }
}

/// Decode an Alert Level payload; any non-zero level reads as "on".
pub fn decode_alarm(data: &[u8]) -> Result<bool, ParseError> {
    Ok(decode_u8(data)? != ALERT_LEVEL_OFF)
}
