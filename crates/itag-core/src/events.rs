//! Session event system for observers.
//!
//! The session emits events instead of invoking named callbacks;
//! observers subscribe through the [`EventDispatcher`]. Events are
//! delivered in the order the triggering transport events were
//! processed and are never batched beyond the smoothing cadence.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted by a tag session.
///
/// All events are serializable for logging, persistence, and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionEvent {
    /// Transport reported a successful connection; discovery started.
    Connected,
    /// All characteristic handles recorded; commands accepted.
    Ready,
    /// Link lost or torn down.
    Disconnected,
    /// The physical button was pressed.
    ButtonActivated {
        /// Press code reported by the button characteristic.
        value: u8,
    },
    /// Battery percentage changed.
    BatteryChanged {
        /// New level, 0-100.
        level: u8,
    },
    /// A new smoothed distance estimate is available.
    DistanceChanged {
        /// Estimated distance in meters, rounded to 2 decimal places.
        meters: f64,
    },
}

/// Sender for session events.
pub type EventSender = broadcast::Sender<SessionEvent>;

/// Receiver for session events.
pub type EventReceiver = broadcast::Receiver<SessionEvent>;

/// Event dispatcher fanning session events out to observers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new dispatcher with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event. Lagging or absent receivers are not an error.
    pub fn send(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}
