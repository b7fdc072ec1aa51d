//! Example: Monitoring an iTag
//!
//! This example scans for a tag, connects, and prints session events
//! as they arrive: readiness, button presses, battery changes, and
//! distance estimates. Press Ctrl-C to disconnect and exit.
//!
//! Run with: `cargo run --example monitor_tag -- <TAG_NAME_OR_ADDRESS>`

use std::env;
use std::time::Duration;

use itag_core::ble::BleTransport;
use itag_core::session::{DeviceSession, SessionConfig};
use itag_core::transport::event_funnel;
use itag_core::{RangeConfig, SessionEvent};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Get tag identifier from command line
    let args: Vec<String> = env::args().collect();
    let identifier = if args.len() > 1 {
        &args[1]
    } else {
        eprintln!("Usage: {} <TAG_NAME_OR_ADDRESS>", args[0]);
        eprintln!();
        eprintln!("Example:");
        eprintln!("  {} iTag", args[0]);
        eprintln!("  {} AA:BB:CC:DD:EE:FF", args[0]);
        std::process::exit(1);
    };

    println!("Scanning for {identifier}...");
    let (tx, rx) = event_funnel();
    let transport = BleTransport::discover(identifier, Duration::from_secs(5), tx).await?;
    println!("Found tag!");

    // Alarm when the tag drifts more than 10 m away.
    let config = SessionConfig::default().range(RangeConfig::new(1, 10, true));
    let mut session = DeviceSession::new(Box::new(transport), config);
    let mut events = session.subscribe();
    session.connect().await?;

    let cancel = CancellationToken::new();
    let driver = tokio::spawn(session.run(rx, cancel.clone()));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Disconnecting...");
                cancel.cancel();
                break;
            }
            event = events.recv() => {
                match event {
                    Ok(SessionEvent::Connected) => println!("Connected, discovering..."),
                    Ok(SessionEvent::Ready) => println!("Session ready"),
                    Ok(SessionEvent::ButtonActivated { value }) => {
                        println!("Button pressed (code {value})");
                    }
                    Ok(SessionEvent::BatteryChanged { level }) => {
                        println!("Battery: {level}%");
                    }
                    Ok(SessionEvent::DistanceChanged { meters }) if meters < 0.0 => {
                        println!("Distance: unknown");
                    }
                    Ok(SessionEvent::DistanceChanged { meters }) => {
                        println!("Distance: {meters:.2} m");
                    }
                    Ok(SessionEvent::Disconnected) => {
                        println!("Tag disconnected");
                        cancel.cancel();
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        eprintln!("Event stream error: {e}");
                        cancel.cancel();
                        break;
                    }
                }
            }
        }
    }

    driver.await?;
    Ok(())
}
