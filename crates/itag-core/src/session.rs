//! Tag session state machine.
//!
//! A [`DeviceSession`] owns all business state for one connected tag:
//! connection/discovery progress, the last button and battery values,
//! the alarm flag, and the RSSI-to-distance pipeline. The transport
//! delivers one [`TransportEvent`] at a time and the session processes
//! it to completion before the next, so no internal locking is needed.
//!
//! Transitions: `Disconnected → Connected` on the transport's connect
//! report, `Connected → Ready` once all three characteristic roles are
//! recorded, and back to `Disconnected` from either state on any
//! transport disconnect.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use itag_types::{
    CharacteristicRole, ConnectionState, decode_alarm, decode_battery, decode_u8, encode_alarm,
    uuid::{BATTERY_SERVICE, BUTTON_SERVICE, IMMEDIATE_ALERT_SERVICE},
};

use crate::alarm::{RangeConfig, should_trigger};
use crate::distance::{DistanceEstimator, round_to_places};
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, EventReceiver, SessionEvent};
use crate::smoothing::SmoothingWindow;
use crate::transport::{TagTransport, TransportEvent, TransportEventReceiver};

/// Default RSSI polling cadence while Ready.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for a tag session.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use itag_core::session::SessionConfig;
/// use itag_core::alarm::RangeConfig;
///
/// let config = SessionConfig::default()
///     .poll_interval(Duration::from_millis(100))
///     .range(RangeConfig::new(2, 15, true));
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often to request a signal-strength sample while Ready.
    pub poll_interval: Duration,
    /// Samples per smoothing batch.
    pub window_size: usize,
    /// Reference RSSI at one meter for the distance model.
    pub tx_power: f64,
    /// Initial proximity alarm band.
    pub range: RangeConfig,
    /// Capacity of the observer event channel.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            window_size: crate::smoothing::DEFAULT_WINDOW_SIZE,
            tx_power: crate::distance::DEFAULT_TX_POWER,
            range: RangeConfig::default(),
            event_capacity: 100,
        }
    }
}

impl SessionConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signal polling interval.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the smoothing batch size.
    #[must_use]
    pub fn window_size(mut self, size: usize) -> Self {
        self.window_size = size;
        self
    }

    /// Set the distance calibration constant.
    #[must_use]
    pub fn tx_power(mut self, tx_power: f64) -> Self {
        self.tx_power = tx_power;
        self
    }

    /// Set the initial alarm range.
    #[must_use]
    pub fn range(mut self, range: RangeConfig) -> Self {
        self.range = range;
        self
    }
}

/// Session with a single iTag peripheral.
pub struct DeviceSession {
    transport: Box<dyn TagTransport>,
    state: ConnectionState,
    button_state: u8,
    alarm_enabled: bool,
    battery_level: u8,
    /// Role → discovered characteristic handle. Empty before discovery,
    /// cleared on disconnect; handles from a previous link are invalid.
    handles: HashMap<CharacteristicRole, Uuid>,
    /// Set when a local alarm change was dropped because the handle was
    /// not yet discovered; the next alarm read-back pushes local state.
    alarm_resync_pending: bool,
    window: SmoothingWindow,
    estimator: DistanceEstimator,
    range: RangeConfig,
    dispatcher: EventDispatcher,
    poll_interval: Duration,
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("state", &self.state)
            .field("button_state", &self.button_state)
            .field("alarm_enabled", &self.alarm_enabled)
            .field("battery_level", &self.battery_level)
            .field("handles", &self.handles)
            .finish_non_exhaustive()
    }
}

impl DeviceSession {
    /// Create a session over the given transport.
    pub fn new(transport: Box<dyn TagTransport>, config: SessionConfig) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected,
            button_state: 0,
            alarm_enabled: false,
            battery_level: 0,
            handles: HashMap::new(),
            alarm_resync_pending: false,
            window: SmoothingWindow::new(config.window_size),
            estimator: DistanceEstimator::new(config.tx_power),
            range: config.range,
            dispatcher: EventDispatcher::new(config.event_capacity),
            poll_interval: config.poll_interval,
        }
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> EventReceiver {
        self.dispatcher.subscribe()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Last known button press code.
    pub fn button_state(&self) -> u8 {
        self.button_state
    }

    /// Local alarm flag (mirrors the remote alert level, write-through).
    pub fn alarm_enabled(&self) -> bool {
        self.alarm_enabled
    }

    /// Last known battery percentage.
    pub fn battery_level(&self) -> u8 {
        self.battery_level
    }

    /// Current alarm range configuration.
    pub fn range(&self) -> &RangeConfig {
        &self.range
    }

    /// Set the lower range bound (clamped below the upper bound).
    pub fn set_min_range(&mut self, min: u32) {
        self.range.set_min_range(min);
    }

    /// Set the upper range bound (clamped above the lower bound).
    pub fn set_max_range(&mut self, max: u32) {
        self.range.set_max_range(max);
    }

    /// Enable or disable the proximity alarm policy.
    pub fn set_range_enabled(&mut self, enabled: bool) {
        self.range.enabled = enabled;
    }

    // --- Commands ---

    /// Ask the transport to connect. No-op unless currently disconnected;
    /// the transport is the source of truth and the `Connected` event
    /// drives the state change.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != ConnectionState::Disconnected {
            debug!(state = %self.state, "connect ignored, already underway");
            return Ok(());
        }
        self.transport.connect().await
    }

    /// Ask the transport to disconnect. No-op when already disconnected.
    pub async fn disconnect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Disconnected {
            return Ok(());
        }
        self.transport.disconnect().await
    }

    /// Set the alarm flag, writing through to the tag.
    ///
    /// No-op if the value is unchanged. When the alert characteristic
    /// has not been discovered yet, the write is dropped (not queued)
    /// but local state still updates; the read-back on the next Ready
    /// pushes it to the device.
    pub async fn set_alarm(&mut self, enabled: bool) -> Result<()> {
        if self.alarm_enabled == enabled {
            return Ok(());
        }
        self.alarm_enabled = enabled;

        match self.handles.get(&CharacteristicRole::Alarm) {
            Some(&handle) => {
                info!(enabled, "writing alarm state");
                self.transport
                    .write_value(handle, &encode_alarm(enabled), true)
                    .await
            }
            None => {
                debug!(enabled, "alarm characteristic undiscovered, write dropped");
                self.alarm_resync_pending = true;
                Ok(())
            }
        }
    }

    /// Set the button state byte (acknowledge/reset a press).
    ///
    /// Same no-op-if-unchanged and drop-if-undiscovered semantics as
    /// [`set_alarm`](Self::set_alarm).
    pub async fn set_button_state(&mut self, value: u8) -> Result<()> {
        if self.button_state == value {
            return Ok(());
        }
        self.button_state = value;

        match self.handles.get(&CharacteristicRole::Button) {
            Some(&handle) => self.transport.write_value(handle, &[value], true).await,
            None => {
                debug!(value, "button characteristic undiscovered, write dropped");
                Ok(())
            }
        }
    }

    /// Request a fresh signal-strength sample from the transport.
    ///
    /// The reading arrives asynchronously as a
    /// [`TransportEvent::SignalStrength`].
    pub async fn request_signal_reading(&self) -> Result<()> {
        if self.state == ConnectionState::Disconnected {
            return Err(Error::NotConnected);
        }
        self.transport.read_signal_strength().await
    }

    // --- Event handling ---

    /// Process one transport event to completion.
    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.on_connected().await,
            TransportEvent::Disconnected => self.on_disconnected(),
            TransportEvent::ServicesDiscovered(services) => {
                self.on_services_discovered(services).await
            }
            TransportEvent::CharacteristicsDiscovered {
                service,
                characteristics,
            } => self.on_characteristics_discovered(service, characteristics).await,
            TransportEvent::ValueUpdated {
                characteristic,
                value,
            } => self.on_value_updated(characteristic, &value).await,
            TransportEvent::SignalStrength(rssi) => self.on_signal_strength(rssi).await,
            TransportEvent::CommandFailed { operation, detail } => {
                // Non-fatal: no retry, no state change.
                warn!(operation, %detail, "transport command failed");
            }
        }
    }

    async fn on_connected(&mut self) {
        if self.state != ConnectionState::Disconnected {
            return;
        }
        info!("tag connected, starting service discovery");
        self.state = ConnectionState::Connected;
        self.dispatcher.send(SessionEvent::Connected);

        let filter = [BUTTON_SERVICE, BATTERY_SERVICE, IMMEDIATE_ALERT_SERVICE];
        if let Err(e) = self.transport.discover_services(Some(&filter)).await {
            warn!(error = %e, "service discovery request failed");
        }
    }

    fn on_disconnected(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        info!("tag disconnected");
        self.state = ConnectionState::Disconnected;
        self.handles.clear();
        self.window.clear();
        self.dispatcher.send(SessionEvent::Disconnected);
    }

    async fn on_services_discovered(&mut self, services: Vec<Uuid>) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        debug!(count = services.len(), "services discovered");

        for service in services {
            let filter = CharacteristicRole::for_service(service).map(|r| [r.characteristic()]);
            // Unrecognized services get a full characteristic discovery
            // to tolerate vendor firmware variance.
            let result = match filter {
                Some(ref chars) => {
                    self.transport
                        .discover_characteristics(service, Some(chars.as_slice()))
                        .await
                }
                None => {
                    debug!(%service, "unrecognized service, discovering all characteristics");
                    self.transport.discover_characteristics(service, None).await
                }
            };
            if let Err(e) = result {
                warn!(%service, error = %e, "characteristic discovery request failed");
            }
        }
    }

    async fn on_characteristics_discovered(&mut self, service: Uuid, characteristics: Vec<Uuid>) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        debug!(%service, count = characteristics.len(), "characteristics discovered");

        for characteristic in characteristics {
            let Some(role) = CharacteristicRole::for_characteristic(characteristic) else {
                continue;
            };
            debug!(%role, %characteristic, "recorded characteristic handle");
            self.handles.insert(role, characteristic);

            if let Err(e) = self.transport.read_value(characteristic).await {
                warn!(%role, error = %e, "initial value read failed");
            }
            if matches!(role, CharacteristicRole::Button | CharacteristicRole::Battery)
                && let Err(e) = self.transport.set_notify(characteristic, true).await
            {
                warn!(%role, error = %e, "notification subscribe failed");
            }
        }

        if self.state == ConnectionState::Connected
            && CharacteristicRole::ALL.iter().all(|r| self.handles.contains_key(r))
        {
            info!("all characteristic handles recorded, session ready");
            self.state = ConnectionState::Ready;
            self.dispatcher.send(SessionEvent::Ready);
        }
    }

    async fn on_value_updated(&mut self, characteristic: Uuid, value: &[u8]) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        let Some(role) = CharacteristicRole::for_characteristic(characteristic) else {
            debug!(%characteristic, "value for unmapped characteristic ignored");
            return;
        };

        match role {
            CharacteristicRole::Button => match decode_u8(value) {
                Ok(code) => {
                    self.button_state = code;
                    // A press is the user's "where is my phone" signal;
                    // refresh the distance estimate right away.
                    if let Err(e) = self.request_signal_reading().await {
                        debug!(error = %e, "signal reading request after press failed");
                    }
                    self.dispatcher
                        .send(SessionEvent::ButtonActivated { value: code });
                }
                Err(e) => warn!(error = %e, "button payload ignored"),
            },
            CharacteristicRole::Battery => match decode_battery(value) {
                Ok(level) => {
                    self.battery_level = level;
                    self.dispatcher.send(SessionEvent::BatteryChanged { level });
                }
                Err(e) => warn!(error = %e, "battery payload ignored"),
            },
            CharacteristicRole::Alarm => match decode_alarm(value) {
                Ok(device_on) => self.reconcile_alarm(device_on).await,
                Err(e) => warn!(error = %e, "alarm payload ignored"),
            },
        }
    }

    /// Reconcile the device-reported alert level with local state.
    ///
    /// The device is the source of truth unless a local change was
    /// dropped while the characteristic was undiscovered; then local
    /// state wins and is written back.
    async fn reconcile_alarm(&mut self, device_on: bool) {
        if self.alarm_resync_pending {
            self.alarm_resync_pending = false;
            if device_on != self.alarm_enabled
                && let Some(&handle) = self.handles.get(&CharacteristicRole::Alarm)
            {
                info!(enabled = self.alarm_enabled, "resyncing dropped alarm write");
                if let Err(e) = self
                    .transport
                    .write_value(handle, &encode_alarm(self.alarm_enabled), true)
                    .await
                {
                    warn!(error = %e, "alarm resync write failed");
                }
            }
        } else {
            self.alarm_enabled = device_on;
        }
    }

    async fn on_signal_strength(&mut self, rssi: i16) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        let Some(average) = self.window.ingest(rssi) else {
            return;
        };

        let meters = round_to_places(self.estimator.estimate(average), 2);
        debug!(average, meters, "distance estimate");
        self.dispatcher.send(SessionEvent::DistanceChanged { meters });

        if should_trigger(meters, &self.range) {
            info!(meters, "distance outside alarm range, arming tag");
            if let Err(e) = self.set_alarm(true).await {
                warn!(error = %e, "alarm trigger write failed");
            }
        }
    }

    // --- Driver ---

    /// Drive the session until cancelled or the transport funnel closes.
    ///
    /// Selects over the cancellation token, the transport event funnel,
    /// and the signal-polling ticker (gated on Ready). Cancellation
    /// issues a disconnect before returning.
    pub async fn run(mut self, mut events: TransportEventReceiver, cancel: CancellationToken) {
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("session cancelled, disconnecting");
                    if let Err(e) = self.disconnect().await {
                        warn!(error = %e, "disconnect on cancel failed");
                    }
                    // The loop exits before the transport's Disconnected
                    // event could be drained; tear down here so observers
                    // still see the session end.
                    self.on_disconnected();
                    break;
                }
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_transport_event(event).await,
                        None => {
                            debug!("transport event funnel closed, stopping");
                            break;
                        }
                    }
                }
                _ = poll.tick(), if self.state.is_ready() => {
                    if let Err(e) = self.transport.read_signal_strength().await {
                        debug!(error = %e, "signal poll failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCommand, MockTransport};

    fn session_with_mock(config: SessionConfig) -> (DeviceSession, MockTransport) {
        let (tx, _rx) = crate::transport::event_funnel();
        let mock = MockTransport::new(tx);
        let session = DeviceSession::new(Box::new(mock.clone()), config);
        (session, mock)
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (mut session, mock) = session_with_mock(SessionConfig::default());

        session.connect().await.unwrap();
        session.handle_transport_event(TransportEvent::Connected).await;
        session.connect().await.unwrap();

        let connects = mock
            .commands()
            .iter()
            .filter(|c| matches!(c, MockCommand::Connect))
            .count();
        assert_eq!(connects, 1);
    }

    #[tokio::test]
    async fn test_disconnect_while_disconnected_is_noop() {
        let (mut session, mock) = session_with_mock(SessionConfig::default());
        session.disconnect().await.unwrap();
        assert!(mock.commands().is_empty());
    }

    #[tokio::test]
    async fn test_set_alarm_unchanged_issues_no_write() {
        let (mut session, mock) = session_with_mock(SessionConfig::default());
        session.set_alarm(false).await.unwrap();
        assert!(mock.commands().is_empty());
    }

    #[tokio::test]
    async fn test_request_signal_reading_requires_connection() {
        let (session, _mock) = session_with_mock(SessionConfig::default());
        assert!(matches!(
            session.request_signal_reading().await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_range_setters_delegate_clamping() {
        let (mut session, _mock) = session_with_mock(SessionConfig::default());
        session.set_max_range(20);
        session.set_min_range(30);
        assert!(session.range().min_range() < session.range().max_range());
    }
}
