//! Core BLE session library for iTag proximity tags.
//!
//! This crate drives the cheap "iTag" key-finder peripherals: a single
//! session per tag that tracks connection state, the tag's button,
//! battery level, and remote alert beeper, and turns polled signal
//! strength into a smoothed distance estimate with an optional
//! out-of-range alarm.
//!
//! # Features
//!
//! - **Session state machine**: Disconnected, Connected, Ready
//! - **Button and battery**: notification-driven value tracking
//! - **Distance estimation**: batched RSSI smoothing and a log-distance model
//! - **Proximity alarm**: sounds the tag when the estimate leaves a range band
//! - **Mock transport**: full session testing without BLE hardware
//!
//! # Quick Start
//!
//! ```no_run
//! use itag_core::ble::BleTransport;
//! use itag_core::session::{DeviceSession, SessionConfig};
//! use itag_core::transport::event_funnel;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (tx, rx) = event_funnel();
//!     let transport = BleTransport::discover("iTag", std::time::Duration::from_secs(5), tx).await?;
//!
//!     let mut session = DeviceSession::new(Box::new(transport), SessionConfig::default());
//!     let mut events = session.subscribe();
//!     session.connect().await?;
//!
//!     tokio::spawn(session.run(rx, CancellationToken::new()));
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod alarm;
pub mod ble;
pub mod distance;
pub mod error;
pub mod events;
pub mod mock;
pub mod session;
pub mod smoothing;
pub mod transport;

// Re-export shared type definitions from itag-types.
pub use itag_types::uuid as uuids;
pub use itag_types::{CharacteristicRole, ConnectionState};

// Core exports
pub use alarm::RangeConfig;
pub use ble::{BleTransport, find_tag};
pub use distance::DistanceEstimator;
pub use error::{Error, Result};
pub use events::{EventDispatcher, EventReceiver, SessionEvent};
pub use mock::{MockCommand, MockTransport};
pub use session::{DeviceSession, SessionConfig};
pub use smoothing::SmoothingWindow;
pub use transport::{TagTransport, TransportEvent, event_funnel};
