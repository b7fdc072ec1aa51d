//! btleplug-backed transport and tag discovery.
//!
//! [`BleTransport`] adapts a [`Peripheral`] to the [`TagTransport`]
//! command surface. Slow radio operations (reads, writes, RSSI) run on
//! spawned tasks so the session loop never waits on the air; outcomes
//! come back through the event funnel, failures as
//! [`TransportEvent::CommandFailed`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use itag_types::CharacteristicRole;

use crate::error::{Error, Result};
use crate::transport::{TagTransport, TransportEvent, TransportEventSender};

/// Default scan duration when searching for a tag.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for establishing the link.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// BLE transport over a btleplug peripheral.
pub struct BleTransport {
    adapter: Adapter,
    peripheral: Peripheral,
    events: TransportEventSender,
    /// UUID → characteristic, filled during discovery.
    characteristics: Arc<RwLock<HashMap<Uuid, Characteristic>>>,
    forwarder_handles: tokio::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
    disconnected: AtomicBool,
}

impl std::fmt::Debug for BleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleTransport")
            .field("peripheral", &self.peripheral.id())
            .field("disconnected", &self.disconnected.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl BleTransport {
    /// Create a transport for an already-discovered peripheral.
    ///
    /// Events are reported on `events`; pair this with the receiver
    /// handed to [`DeviceSession::run`](crate::session::DeviceSession::run).
    pub fn new(adapter: Adapter, peripheral: Peripheral, events: TransportEventSender) -> Self {
        Self {
            adapter,
            peripheral,
            events,
            characteristics: Arc::new(RwLock::new(HashMap::new())),
            forwarder_handles: tokio::sync::Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(true),
        }
    }

    /// Scan for a tag and build a transport for it, ready to connect.
    pub async fn discover(
        identifier: &str,
        scan_timeout: Duration,
        events: TransportEventSender,
    ) -> Result<Self> {
        let (adapter, peripheral) = find_tag(identifier, scan_timeout).await?;
        Ok(Self::new(adapter, peripheral, events))
    }

    fn send(&self, event: TransportEvent) {
        // Receiver gone means the session stopped; nothing to do.
        let _ = self.events.send(event);
    }

    async fn find_characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        self.characteristics.read().await.get(&uuid).cloned().ok_or_else(|| {
            match CharacteristicRole::for_characteristic(uuid) {
                Some(role) => Error::CharacteristicUnavailable { role },
                None => Error::Transport(btleplug::Error::NoSuchCharacteristic),
            }
        })
    }

    /// Forward the notification stream into the event funnel.
    async fn spawn_notification_forwarder(&self) -> Result<()> {
        let mut stream = self.peripheral.notifications().await?;
        let events = self.events.clone();

        let handle = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                let _ = events.send(TransportEvent::ValueUpdated {
                    characteristic: notification.uuid,
                    value: notification.value,
                });
            }
            debug!("notification stream ended");
        });
        self.forwarder_handles.lock().await.push(handle);
        Ok(())
    }

    /// Watch adapter events for an unsolicited disconnect of this peripheral.
    async fn spawn_disconnect_watcher(&self) -> Result<()> {
        let mut stream = self.adapter.events().await?;
        let events = self.events.clone();
        let id = self.peripheral.id();

        let handle = tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                if let CentralEvent::DeviceDisconnected(peripheral_id) = event
                    && peripheral_id == id
                {
                    warn!("peripheral disconnected unexpectedly");
                    let _ = events.send(TransportEvent::Disconnected);
                    break;
                }
            }
        });
        self.forwarder_handles.lock().await.push(handle);
        Ok(())
    }

    async fn abort_forwarders(&self) {
        let mut handles = self.forwarder_handles.lock().await;
        for handle in handles.drain(..) {
            handle.abort();
        }
    }
}

#[async_trait::async_trait]
impl TagTransport for BleTransport {
    async fn connect(&self) -> Result<()> {
        info!("connecting to tag");
        timeout(CONNECT_TIMEOUT, self.peripheral.connect())
            .await
            .map_err(|_| Error::timeout("connect", CONNECT_TIMEOUT))??;

        self.disconnected.store(false, Ordering::SeqCst);
        self.spawn_notification_forwarder().await?;
        self.spawn_disconnect_watcher().await?;
        self.send(TransportEvent::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Ok(());
        }
        info!("disconnecting from tag");
        self.abort_forwarders().await;
        self.characteristics.write().await.clear();

        // The session must observe the teardown even if the radio call
        // fails; the flag only latches on success so a caller can retry.
        let result = self.peripheral.disconnect().await;
        if result.is_ok() {
            self.disconnected.store(true, Ordering::SeqCst);
        }
        self.send(TransportEvent::Disconnected);
        result.map_err(Error::from)
    }

    async fn discover_services(&self, filter: Option<&[Uuid]>) -> Result<()> {
        self.peripheral.discover_services().await?;

        let services: Vec<Uuid> = self
            .peripheral
            .services()
            .iter()
            .map(|s| s.uuid)
            .filter(|uuid| filter.is_none_or(|wanted| wanted.contains(uuid)))
            .collect();
        debug!(count = services.len(), "services discovered");
        self.send(TransportEvent::ServicesDiscovered(services));
        Ok(())
    }

    async fn discover_characteristics(&self, service: Uuid, filter: Option<&[Uuid]>) -> Result<()> {
        // btleplug discovers everything up front; this just reads the
        // already-populated service table.
        let Some(found) = self.peripheral.services().into_iter().find(|s| s.uuid == service)
        else {
            self.send(TransportEvent::CharacteristicsDiscovered {
                service,
                characteristics: Vec::new(),
            });
            return Ok(());
        };

        let mut characteristics = Vec::new();
        {
            let mut cache = self.characteristics.write().await;
            for characteristic in &found.characteristics {
                if filter.is_none_or(|wanted| wanted.contains(&characteristic.uuid)) {
                    cache.insert(characteristic.uuid, characteristic.clone());
                    characteristics.push(characteristic.uuid);
                }
            }
        }
        debug!(%service, count = characteristics.len(), "characteristics discovered");
        self.send(TransportEvent::CharacteristicsDiscovered {
            service,
            characteristics,
        });
        Ok(())
    }

    async fn read_value(&self, characteristic: Uuid) -> Result<()> {
        let target = self.find_characteristic(characteristic).await?;
        let peripheral = self.peripheral.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            match peripheral.read(&target).await {
                Ok(value) => {
                    let _ = events.send(TransportEvent::ValueUpdated {
                        characteristic,
                        value,
                    });
                }
                Err(e) => {
                    let _ = events.send(TransportEvent::CommandFailed {
                        operation: "read_value",
                        detail: e.to_string(),
                    });
                }
            }
        });
        Ok(())
    }

    async fn write_value(&self, characteristic: Uuid, data: &[u8], with_response: bool) -> Result<()> {
        let target = self.find_characteristic(characteristic).await?;
        let peripheral = self.peripheral.clone();
        let events = self.events.clone();
        let data = data.to_vec();
        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        tokio::spawn(async move {
            if let Err(e) = peripheral.write(&target, &data, write_type).await {
                let _ = events.send(TransportEvent::CommandFailed {
                    operation: "write_value",
                    detail: e.to_string(),
                });
            }
        });
        Ok(())
    }

    async fn set_notify(&self, characteristic: Uuid, enabled: bool) -> Result<()> {
        let target = self.find_characteristic(characteristic).await?;
        if enabled {
            self.peripheral.subscribe(&target).await?;
        } else {
            self.peripheral.unsubscribe(&target).await?;
        }
        Ok(())
    }

    async fn read_signal_strength(&self) -> Result<()> {
        let peripheral = self.peripheral.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            match peripheral.properties().await {
                Ok(Some(props)) => match props.rssi {
                    Some(rssi) => {
                        let _ = events.send(TransportEvent::SignalStrength(rssi));
                    }
                    None => {
                        let _ = events.send(TransportEvent::CommandFailed {
                            operation: "read_signal_strength",
                            detail: "RSSI not available".to_string(),
                        });
                    }
                },
                Ok(None) => {
                    let _ = events.send(TransportEvent::CommandFailed {
                        operation: "read_signal_strength",
                        detail: "peripheral properties unavailable".to_string(),
                    });
                }
                Err(e) => {
                    let _ = events.send(TransportEvent::CommandFailed {
                        operation: "read_signal_strength",
                        detail: e.to_string(),
                    });
                }
            }
        });
        Ok(())
    }
}

// Best-effort cleanup when the transport is dropped without an explicit
// disconnect. Callers SHOULD call `disconnect().await` themselves; the
// spawned task may not complete during runtime shutdown.
impl Drop for BleTransport {
    fn drop(&mut self) {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!("transport dropped while connected, spawning cleanup");

        if let Ok(mut handles) = self.forwarder_handles.try_lock() {
            for handle in handles.drain(..) {
                handle.abort();
            }
        }

        let peripheral = self.peripheral.clone();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                let _ = peripheral.disconnect().await;
            });
        }
    }
}

/// Find an iTag peripheral by name fragment or address.
///
/// Scans for up to `scan_timeout` and matches case-insensitively on the
/// advertised name, or exactly on the address / peripheral id.
pub async fn find_tag(identifier: &str, scan_timeout: Duration) -> Result<(Adapter, Peripheral)> {
    let adapter = default_adapter().await?;

    info!(identifier, ?scan_timeout, "scanning for tag");
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(scan_timeout).await;
    adapter.stop_scan().await?;

    let wanted = identifier.to_lowercase();
    for peripheral in adapter.peripherals().await? {
        if peripheral.id().to_string().eq_ignore_ascii_case(identifier) {
            return Ok((adapter, peripheral));
        }

        let Ok(Some(properties)) = peripheral.properties().await else {
            continue;
        };
        if properties.address.to_string().eq_ignore_ascii_case(identifier) {
            return Ok((adapter, peripheral));
        }
        if let Some(name) = &properties.local_name
            && name.to_lowercase().contains(&wanted)
        {
            debug!(name, "matched tag by name");
            return Ok((adapter, peripheral));
        }
    }

    warn!(identifier, "no matching tag found");
    Err(Error::DeviceNotFound(identifier.to_string()))
}

async fn default_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::DeviceNotFound("no Bluetooth adapter".to_string()))
}
