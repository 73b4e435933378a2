//! Operator probe so a session backend can be exercised without a UI.
//!
//! Connects to the configured backend, prints every snapshot transition as a
//! JSON line, and exits when the session reaches a terminal state. Useful for
//! checking a backend deployment or watching the event flow live.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use sousvoice::{
    telemetry, ConnectionState, NullCapture, SessionConfig, VoiceSessionManager, WsTransport,
};

/// Give the backend this long to produce any snapshot change before giving up.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> Result<()> {
    let config = SessionConfig::parse();
    config.validate()?;
    telemetry::init_tracing(&config);

    let transport = WsTransport::new(config.backend_url.clone())?;
    let manager =
        VoiceSessionManager::spawn(config, Box::new(transport), Box::new(NullCapture))?;
    let updates = manager.subscribe();
    manager.connect();

    let mut was_connected = false;
    loop {
        let snapshot = match updates.recv_timeout(IDLE_TIMEOUT) {
            Ok(snapshot) => snapshot,
            Err(_) => {
                eprintln!("no session activity for {}s; exiting", IDLE_TIMEOUT.as_secs());
                break;
            }
        };
        println!(
            "{}",
            serde_json::to_string(snapshot.as_ref()).context("failed to encode snapshot")?
        );
        match &snapshot.connection {
            ConnectionState::Connected => was_connected = true,
            ConnectionState::Error { message } => {
                eprintln!("session ended with error: {message}");
                break;
            }
            ConnectionState::Disconnected if was_connected => break,
            _ => {}
        }
    }

    manager.shutdown();
    Ok(())
}
