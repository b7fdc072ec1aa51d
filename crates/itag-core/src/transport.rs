//! Transport boundary between the session and the BLE stack.
//!
//! The session never blocks on the radio: every [`TagTransport`]
//! method is a fire-and-forget command, and results come back later as
//! [`TransportEvent`]s on an mpsc funnel handed to the transport at
//! construction. That funnel is the single point where a concurrent
//! BLE stack is marshaled onto the session's sequential context.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;

/// Asynchronous events delivered by the transport into the session.
///
/// Ordering is guaranteed per characteristic, not across
/// characteristics.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Link established.
    Connected,
    /// Link lost, whether requested or not.
    Disconnected,
    /// Service discovery finished; the listed services were found.
    ServicesDiscovered(Vec<Uuid>),
    /// Characteristic discovery finished for one service.
    CharacteristicsDiscovered {
        /// The service that was searched.
        service: Uuid,
        /// Characteristics found under it.
        characteristics: Vec<Uuid>,
    },
    /// A read completed or a notification arrived.
    ValueUpdated {
        /// The characteristic that produced the value.
        characteristic: Uuid,
        /// Raw payload bytes.
        value: Vec<u8>,
    },
    /// A signal-strength reading, in dBm.
    SignalStrength(i16),
    /// A previously issued command failed; non-fatal.
    CommandFailed {
        /// Which command failed.
        operation: &'static str,
        /// Transport-level detail for logging.
        detail: String,
    },
}

/// Sender half of the transport event funnel.
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiver half of the transport event funnel; owned by the session
/// run loop.
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Create the transport event funnel.
pub fn event_funnel() -> (TransportEventSender, TransportEventReceiver) {
    mpsc::unbounded_channel()
}

/// Commands the session issues against the BLE stack.
///
/// Implementations report outcomes through the event funnel; a method
/// returning `Ok(())` only means the command was accepted. Errors from
/// the local stack (adapter gone, invalid handle) may still surface as
/// `Err` directly.
#[async_trait]
pub trait TagTransport: Send + Sync {
    /// Open the link to the peripheral.
    async fn connect(&self) -> Result<()>;

    /// Tear the link down.
    ///
    /// Implementations report [`TransportEvent::Disconnected`] on the
    /// funnel even when the teardown itself errors, so the session
    /// always observes the end of the link; the error return is for
    /// the caller, which may reissue the command.
    async fn disconnect(&self) -> Result<()>;

    /// Discover services, optionally filtered to the given UUIDs.
    async fn discover_services(&self, filter: Option<&[Uuid]>) -> Result<()>;

    /// Discover characteristics under a service, optionally filtered.
    async fn discover_characteristics(&self, service: Uuid, filter: Option<&[Uuid]>)
    -> Result<()>;

    /// Read a characteristic; the value arrives as
    /// [`TransportEvent::ValueUpdated`].
    async fn read_value(&self, characteristic: Uuid) -> Result<()>;

    /// Write a characteristic value, single attempt.
    async fn write_value(&self, characteristic: Uuid, data: &[u8], with_response: bool)
    -> Result<()>;

    /// Enable or disable change notifications on a characteristic.
    async fn set_notify(&self, characteristic: Uuid, enabled: bool) -> Result<()>;

    /// Request a fresh RSSI sample; arrives as
    /// [`TransportEvent::SignalStrength`].
    async fn read_signal_strength(&self) -> Result<()>;
}
