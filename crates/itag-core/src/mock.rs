//! Mock transport implementation for testing.
//!
//! This module provides a mock transport that can be used for unit testing
//! without requiring actual BLE hardware.
//!
//! The [`MockTransport`] implements the [`TagTransport`] trait, so a
//! [`DeviceSession`](crate::session::DeviceSession) runs against it
//! unchanged. Every trait call is recorded as a [`MockCommand`] for
//! assertions, and tests drive the session by emitting
//! [`TransportEvent`]s through the transport's funnel sender.
//!
//! # Features
//!
//! - **Command recording**: Assert exactly which operations the session issued
//! - **Failure injection**: Make every operation report a transport error
//! - **Event emission**: Push transport events as if radio traffic arrived

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::transport::{TagTransport, TransportEvent, TransportEventSender};

/// One recorded transport operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCommand {
    Connect,
    Disconnect,
    DiscoverServices {
        filter: Option<Vec<Uuid>>,
    },
    DiscoverCharacteristics {
        service: Uuid,
        filter: Option<Vec<Uuid>>,
    },
    ReadValue {
        characteristic: Uuid,
    },
    WriteValue {
        characteristic: Uuid,
        data: Vec<u8>,
        with_response: bool,
    },
    SetNotify {
        characteristic: Uuid,
        enabled: bool,
    },
    ReadSignalStrength,
}

struct Inner {
    address: String,
    commands: Mutex<Vec<MockCommand>>,
    should_fail: AtomicBool,
    fail_message: Mutex<String>,
    events: TransportEventSender,
}

/// A mock tag transport for testing.
///
/// Cloning is cheap and clones share state, so a test can hand one
/// clone to the session and keep another for assertions.
///
/// # Example
///
/// ```
/// use itag_core::mock::{MockCommand, MockTransport};
/// use itag_core::transport::{TagTransport, event_funnel};
///
/// #[tokio::main]
/// async fn main() {
///     let (tx, _rx) = event_funnel();
///     let mock = MockTransport::new(tx);
///     mock.connect().await.unwrap();
///     assert_eq!(mock.commands(), vec![MockCommand::Connect]);
/// }
/// ```
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("address", &self.inner.address)
            .field(
                "should_fail",
                &self.inner.should_fail.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl MockTransport {
    /// Create a mock transport that reports events on `events`.
    pub fn new(events: TransportEventSender) -> Self {
        Self {
            inner: Arc::new(Inner {
                address: format!("MOCK-{:06X}", rand::random::<u32>() % 0xFF_FFFF),
                commands: Mutex::new(Vec::new()),
                should_fail: AtomicBool::new(false),
                fail_message: Mutex::new("Mock failure".to_string()),
                events,
            }),
        }
    }

    /// Get the simulated peripheral address.
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// All commands recorded so far, in issue order.
    pub fn commands(&self) -> Vec<MockCommand> {
        self.inner.commands.lock().unwrap().clone()
    }

    /// Discard the recorded command log.
    pub fn clear_commands(&self) {
        self.inner.commands.lock().unwrap().clear();
    }

    /// Make every subsequent operation fail.
    pub fn set_should_fail(&self, fail: bool) {
        self.inner.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Set the message carried by injected failures.
    pub fn set_fail_message(&self, message: &str) {
        *self.inner.fail_message.lock().unwrap() = message.to_string();
    }

    /// Emit a transport event as if it arrived from the radio.
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.inner.events.send(event);
    }

    fn record(&self, command: MockCommand) -> Result<()> {
        if self.inner.should_fail.load(Ordering::Relaxed) {
            let message = self.inner.fail_message.lock().unwrap().clone();
            return Err(Error::Transport(btleplug::Error::RuntimeError(message)));
        }
        self.inner.commands.lock().unwrap().push(command);
        Ok(())
    }
}

#[async_trait]
impl TagTransport for MockTransport {
    async fn connect(&self) -> Result<()> {
        self.record(MockCommand::Connect)
    }

    async fn disconnect(&self) -> Result<()> {
        self.record(MockCommand::Disconnect)
    }

    async fn discover_services(&self, filter: Option<&[Uuid]>) -> Result<()> {
        self.record(MockCommand::DiscoverServices {
            filter: filter.map(<[Uuid]>::to_vec),
        })
    }

    async fn discover_characteristics(
        &self,
        service: Uuid,
        filter: Option<&[Uuid]>,
    ) -> Result<()> {
        self.record(MockCommand::DiscoverCharacteristics {
            service,
            filter: filter.map(<[Uuid]>::to_vec),
        })
    }

    async fn read_value(&self, characteristic: Uuid) -> Result<()> {
        self.record(MockCommand::ReadValue { characteristic })
    }

    async fn write_value(&self, characteristic: Uuid, data: &[u8], with_response: bool) -> Result<()> {
        self.record(MockCommand::WriteValue {
            characteristic,
            data: data.to_vec(),
            with_response,
        })
    }

    async fn set_notify(&self, characteristic: Uuid, enabled: bool) -> Result<()> {
        self.record(MockCommand::SetNotify {
            characteristic,
            enabled,
        })
    }

    async fn read_signal_strength(&self) -> Result<()> {
        self.record(MockCommand::ReadSignalStrength)
    }
}
