//! Bluetooth UUIDs for iTag proximity tags.
//!
//! This module contains the service and characteristic UUIDs needed to
//! talk to the common iTag keyfinder firmware over Bluetooth Low Energy.

use uuid::{Uuid, uuid};

// --- Vendor service UUIDs ---

/// Vendor button service exposed by iTag firmware.
pub const BUTTON_SERVICE: Uuid = uuid!("0000ffe0-0000-1000-8000-00805f9b34fb");

/// Button-clicked characteristic; notifies the press code on each press.
pub const BUTTON_CLICKED: Uuid = uuid!("0000ffe1-0000-1000-8000-00805f9b34fb");

// --- Standard BLE service UUIDs ---

/// Immediate Alert service (assigned number 0x1802).
pub const IMMEDIATE_ALERT_SERVICE: Uuid = uuid!("00001802-0000-1000-8000-00805f9b34fb");

/// Alert Level characteristic (assigned number 0x2A06); write-only alarm control.
pub const ALERT_LEVEL: Uuid = uuid!("00002a06-0000-1000-8000-00805f9b34fb");

/// Battery service (assigned number 0x180F).
pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");

/// Battery Level characteristic (assigned number 0x2A19); percentage byte.
pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");

// --- Alert Level payload bytes ---

/// Alert Level payload for "high alert" (tag beeps).
pub const ALERT_LEVEL_HIGH: u8 = 0x02;

/// Alert Level payload for "no alert".
pub const ALERT_LEVEL_OFF: u8 = 0x00;
