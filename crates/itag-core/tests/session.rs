//! Session integration tests against the mock transport.
//!
//! These drive the session through transport events directly, the same
//! stream a live BLE stack would produce, and assert on observer events
//! and recorded mock commands.

use itag_core::mock::{MockCommand, MockTransport};
use itag_core::session::{DeviceSession, SessionConfig};
use itag_core::transport::{TransportEvent, event_funnel};
use itag_core::{ConnectionState, EventReceiver, SessionEvent};
use tokio_util::sync::CancellationToken;
use itag_types::uuid::{
    ALERT_LEVEL, BATTERY_LEVEL, BATTERY_SERVICE, BUTTON_CLICKED, BUTTON_SERVICE,
    IMMEDIATE_ALERT_SERVICE,
};

fn new_session(config: SessionConfig) -> (DeviceSession, MockTransport, EventReceiver) {
    let (tx, _rx) = event_funnel();
    let mock = MockTransport::new(tx);
    let session = DeviceSession::new(Box::new(mock.clone()), config);
    let events = session.subscribe();
    (session, mock, events)
}

fn drain(events: &mut EventReceiver) -> Vec<SessionEvent> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

/// Drive the session from disconnected through full discovery to Ready.
async fn bring_to_ready(session: &mut DeviceSession) {
    session.handle_transport_event(TransportEvent::Connected).await;
    session
        .handle_transport_event(TransportEvent::ServicesDiscovered(vec![
            BUTTON_SERVICE,
            IMMEDIATE_ALERT_SERVICE,
            BATTERY_SERVICE,
        ]))
        .await;
    for (service, characteristic) in [
        (BUTTON_SERVICE, BUTTON_CLICKED),
        (IMMEDIATE_ALERT_SERVICE, ALERT_LEVEL),
        (BATTERY_SERVICE, BATTERY_LEVEL),
    ] {
        session
            .handle_transport_event(TransportEvent::CharacteristicsDiscovered {
                service,
                characteristics: vec![characteristic],
            })
            .await;
    }
}

fn alarm_writes(mock: &MockTransport) -> Vec<Vec<u8>> {
    mock.commands()
        .into_iter()
        .filter_map(|c| match c {
            MockCommand::WriteValue {
                characteristic,
                data,
                ..
            } if characteristic == ALERT_LEVEL => Some(data),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_discovery_reaches_ready() {
    let (mut session, mock, mut events) = new_session(SessionConfig::default());

    bring_to_ready(&mut session).await;

    assert_eq!(session.state(), ConnectionState::Ready);
    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::Connected, SessionEvent::Ready]
    );

    // Discovery requested characteristics for each service and read
    // back every discovered value.
    let commands = mock.commands();
    let discoveries = commands
        .iter()
        .filter(|c| matches!(c, MockCommand::DiscoverCharacteristics { .. }))
        .count();
    assert_eq!(discoveries, 3);
    let reads = commands
        .iter()
        .filter(|c| matches!(c, MockCommand::ReadValue { .. }))
        .count();
    assert_eq!(reads, 3);
}

#[tokio::test]
async fn test_ready_waits_for_all_roles_regardless_of_order() {
    let (mut session, _mock, _events) = new_session(SessionConfig::default());

    session.handle_transport_event(TransportEvent::Connected).await;
    // Alarm and battery first, button last.
    for (service, characteristic) in [
        (IMMEDIATE_ALERT_SERVICE, ALERT_LEVEL),
        (BATTERY_SERVICE, BATTERY_LEVEL),
    ] {
        session
            .handle_transport_event(TransportEvent::CharacteristicsDiscovered {
                service,
                characteristics: vec![characteristic],
            })
            .await;
        assert_eq!(session.state(), ConnectionState::Connected);
    }
    session
        .handle_transport_event(TransportEvent::CharacteristicsDiscovered {
            service: BUTTON_SERVICE,
            characteristics: vec![BUTTON_CLICKED],
        })
        .await;
    assert_eq!(session.state(), ConnectionState::Ready);
}

#[tokio::test]
async fn test_notifications_enabled_for_button_and_battery_only() {
    let (mut session, mock, _events) = new_session(SessionConfig::default());
    bring_to_ready(&mut session).await;

    let notifies: Vec<_> = mock
        .commands()
        .into_iter()
        .filter_map(|c| match c {
            MockCommand::SetNotify {
                characteristic,
                enabled: true,
            } => Some(characteristic),
            _ => None,
        })
        .collect();
    assert_eq!(notifies.len(), 2);
    assert!(notifies.contains(&BUTTON_CLICKED));
    assert!(notifies.contains(&BATTERY_LEVEL));
}

#[tokio::test]
async fn test_set_alarm_writes_once() {
    let (mut session, mock, _events) = new_session(SessionConfig::default());
    bring_to_ready(&mut session).await;
    mock.clear_commands();

    session.set_alarm(true).await.unwrap();
    session.set_alarm(true).await.unwrap();

    assert_eq!(alarm_writes(&mock), vec![vec![0x02]]);
    assert!(session.alarm_enabled());

    session.set_alarm(false).await.unwrap();
    assert_eq!(alarm_writes(&mock), vec![vec![0x02], vec![0x00]]);
}

#[tokio::test]
async fn test_alarm_write_dropped_then_resynced_on_readback() {
    let (mut session, mock, _events) = new_session(SessionConfig::default());
    session.handle_transport_event(TransportEvent::Connected).await;

    // Alert characteristic not discovered yet: local flag flips, no write.
    session.set_alarm(true).await.unwrap();
    assert!(session.alarm_enabled());
    assert!(alarm_writes(&mock).is_empty());

    session
        .handle_transport_event(TransportEvent::CharacteristicsDiscovered {
            service: IMMEDIATE_ALERT_SERVICE,
            characteristics: vec![ALERT_LEVEL],
        })
        .await;
    // Device reports the beeper off; the dropped local change wins.
    session
        .handle_transport_event(TransportEvent::ValueUpdated {
            characteristic: ALERT_LEVEL,
            value: vec![0x00],
        })
        .await;

    assert!(session.alarm_enabled());
    assert_eq!(alarm_writes(&mock), vec![vec![0x02]]);
}

#[tokio::test]
async fn test_alarm_readback_updates_local_state() {
    let (mut session, _mock, _events) = new_session(SessionConfig::default());
    bring_to_ready(&mut session).await;

    // No pending local change, so the device value is authoritative.
    session
        .handle_transport_event(TransportEvent::ValueUpdated {
            characteristic: ALERT_LEVEL,
            value: vec![0x02],
        })
        .await;
    assert!(session.alarm_enabled());
}

#[tokio::test]
async fn test_button_press_emits_event_and_requests_signal() {
    let (mut session, mock, mut events) = new_session(SessionConfig::default());
    bring_to_ready(&mut session).await;
    mock.clear_commands();
    drain(&mut events);

    session
        .handle_transport_event(TransportEvent::ValueUpdated {
            characteristic: BUTTON_CLICKED,
            value: vec![0x01],
        })
        .await;

    assert_eq!(session.button_state(), 1);
    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::ButtonActivated { value: 1 }]
    );
    assert!(mock.commands().contains(&MockCommand::ReadSignalStrength));
}

#[tokio::test]
async fn test_battery_notification_decodes_percentage() {
    let (mut session, _mock, mut events) = new_session(SessionConfig::default());
    bring_to_ready(&mut session).await;
    drain(&mut events);

    session
        .handle_transport_event(TransportEvent::ValueUpdated {
            characteristic: BATTERY_LEVEL,
            value: vec![0x4B],
        })
        .await;

    assert_eq!(session.battery_level(), 75);
    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::BatteryChanged { level: 75 }]
    );
}

#[tokio::test]
async fn test_empty_payload_is_ignored() {
    let (mut session, _mock, mut events) = new_session(SessionConfig::default());
    bring_to_ready(&mut session).await;
    drain(&mut events);

    session
        .handle_transport_event(TransportEvent::ValueUpdated {
            characteristic: BATTERY_LEVEL,
            value: vec![],
        })
        .await;

    assert_eq!(session.battery_level(), 0);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn test_ten_samples_produce_one_distance_event() {
    let (mut session, _mock, mut events) = new_session(SessionConfig::default());
    bring_to_ready(&mut session).await;
    drain(&mut events);

    for _ in 0..10 {
        session
            .handle_transport_event(TransportEvent::SignalStrength(-60))
            .await;
    }

    // Average -60 at txPower -60 gives ratio 1.0, model yields
    // 0.89976 + 0.111 = 1.01076, rounded to 1.01.
    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::DistanceChanged { meters: 1.01 }]
    );
}

#[tokio::test]
async fn test_partial_window_emits_nothing() {
    let (mut session, _mock, mut events) = new_session(SessionConfig::default());
    bring_to_ready(&mut session).await;
    drain(&mut events);

    for _ in 0..9 {
        session
            .handle_transport_event(TransportEvent::SignalStrength(-60))
            .await;
    }
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn test_disconnect_discards_partial_window() {
    let (mut session, _mock, mut events) = new_session(SessionConfig::default());
    bring_to_ready(&mut session).await;

    for _ in 0..5 {
        session
            .handle_transport_event(TransportEvent::SignalStrength(-30))
            .await;
    }
    session.handle_transport_event(TransportEvent::Disconnected).await;
    assert_eq!(session.state(), ConnectionState::Disconnected);

    bring_to_ready(&mut session).await;
    drain(&mut events);

    // The fresh link needs a full batch of its own.
    for _ in 0..9 {
        session
            .handle_transport_event(TransportEvent::SignalStrength(-60))
            .await;
    }
    assert!(drain(&mut events).is_empty());
    session
        .handle_transport_event(TransportEvent::SignalStrength(-60))
        .await;
    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::DistanceChanged { meters: 1.01 }]
    );
}

#[tokio::test]
async fn test_out_of_range_distance_arms_the_tag() {
    let config = SessionConfig::default()
        .range(itag_core::RangeConfig::new(5, 20, true));
    let (mut session, mock, _events) = new_session(config);
    bring_to_ready(&mut session).await;
    mock.clear_commands();

    // Average -30 gives ratio 0.5, 0.5^10 rounds to 0.00 meters,
    // below the 5 m lower bound.
    for _ in 0..10 {
        session
            .handle_transport_event(TransportEvent::SignalStrength(-30))
            .await;
    }

    assert!(session.alarm_enabled());
    assert_eq!(alarm_writes(&mock), vec![vec![0x02]]);
}

#[tokio::test]
async fn test_disabled_range_never_arms() {
    let config = SessionConfig::default()
        .range(itag_core::RangeConfig::new(5, 20, false));
    let (mut session, mock, _events) = new_session(config);
    bring_to_ready(&mut session).await;
    mock.clear_commands();

    for _ in 0..10 {
        session
            .handle_transport_event(TransportEvent::SignalStrength(-30))
            .await;
    }

    assert!(!session.alarm_enabled());
    assert!(alarm_writes(&mock).is_empty());
}

#[tokio::test]
async fn test_unreadable_signal_reports_sentinel_without_alarm() {
    let config = SessionConfig::default()
        .range(itag_core::RangeConfig::new(5, 20, true));
    let (mut session, mock, mut events) = new_session(config);
    bring_to_ready(&mut session).await;
    mock.clear_commands();
    drain(&mut events);

    for _ in 0..10 {
        session
            .handle_transport_event(TransportEvent::SignalStrength(0))
            .await;
    }

    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::DistanceChanged { meters: -1.0 }]
    );
    assert!(alarm_writes(&mock).is_empty());
}

#[tokio::test]
async fn test_command_failure_leaves_state_untouched() {
    let (mut session, _mock, mut events) = new_session(SessionConfig::default());
    bring_to_ready(&mut session).await;
    drain(&mut events);

    session
        .handle_transport_event(TransportEvent::CommandFailed {
            operation: "read_value",
            detail: "gatt error".to_string(),
        })
        .await;

    assert_eq!(session.state(), ConnectionState::Ready);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn test_oversized_battery_percentage_is_ignored() {
    let (mut session, _mock, mut events) = new_session(SessionConfig::default());
    bring_to_ready(&mut session).await;
    drain(&mut events);

    session
        .handle_transport_event(TransportEvent::ValueUpdated {
            characteristic: BATTERY_LEVEL,
            value: vec![150],
        })
        .await;

    assert_eq!(session.battery_level(), 0);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn test_failed_disconnect_event_still_tears_down() {
    let (mut session, mock, _events) = new_session(SessionConfig::default());
    bring_to_ready(&mut session).await;

    // The radio call errors, but the transport still reports the
    // teardown on the funnel; the session must leave Ready.
    mock.set_should_fail(true);
    assert!(session.disconnect().await.is_err());
    assert_eq!(session.state(), ConnectionState::Ready);

    session.handle_transport_event(TransportEvent::Disconnected).await;
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_cancellation_emits_disconnected() {
    let (tx, rx) = event_funnel();
    let mock = MockTransport::new(tx);
    let session = DeviceSession::new(Box::new(mock.clone()), SessionConfig::default());
    let mut events = session.subscribe();
    let cancel = CancellationToken::new();
    let driver = tokio::spawn(session.run(rx, cancel.clone()));

    mock.emit(TransportEvent::Connected);
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Connected);

    cancel.cancel();
    driver.await.unwrap();
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Disconnected);
    assert!(mock.commands().contains(&MockCommand::Disconnect));
}

#[tokio::test]
async fn test_events_after_disconnect_are_ignored() {
    let (mut session, _mock, mut events) = new_session(SessionConfig::default());
    bring_to_ready(&mut session).await;
    session.handle_transport_event(TransportEvent::Disconnected).await;
    drain(&mut events);

    session
        .handle_transport_event(TransportEvent::ValueUpdated {
            characteristic: BATTERY_LEVEL,
            value: vec![0x64],
        })
        .await;
    session
        .handle_transport_event(TransportEvent::SignalStrength(-60))
        .await;

    assert_eq!(session.battery_level(), 0);
    assert!(drain(&mut events).is_empty());
}
