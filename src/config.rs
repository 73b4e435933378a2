//! Session configuration so flags, env vars, and defaults resolve consistently.

use anyhow::{bail, Result};
use clap::Parser;

/// Floor for the meter publish interval; anything faster is UI noise.
pub const MIN_METER_UPDATE_MS: u64 = 10;

/// Floor for the event channel so bursts of frames cannot instantly backpressure.
pub const MIN_EVENT_CAPACITY: usize = 16;

/// Runtime configuration for one voice session.
///
/// Every field has a CLI flag, an environment fallback, and a default, so the
/// probe binary and embedding applications resolve settings the same way.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sousvoice",
    about = "Voice session core for the SousChef cooking assistant",
    version
)]
pub struct SessionConfig {
    /// WebSocket URL of the speech/LLM backend
    #[arg(
        long = "backend-url",
        env = "SOUSVOICE_BACKEND_URL",
        default_value = "ws://127.0.0.1:8787/session"
    )]
    pub backend_url: String,

    /// Start with always-listening mode enabled
    #[arg(
        long = "always-listening",
        env = "SOUSVOICE_ALWAYS_LISTENING",
        default_value_t = false
    )]
    pub always_listening: bool,

    /// Minimum interval between published audio-level updates (ms)
    #[arg(
        long = "meter-update-ms",
        env = "SOUSVOICE_METER_UPDATE_MS",
        default_value_t = 80
    )]
    pub meter_update_ms: u64,

    /// Max pending session events before producers block
    #[arg(
        long = "event-capacity",
        env = "SOUSVOICE_EVENT_CAPACITY",
        default_value_t = 256
    )]
    pub event_capacity: usize,

    /// Enable JSON trace logging to the trace file
    #[arg(long = "logs", default_value_t = false)]
    pub logs: bool,

    /// Disable all log output even when --logs is set
    #[arg(long = "no-logs", default_value_t = false)]
    pub no_logs: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::parse_from(["sousvoice"])
    }
}

impl SessionConfig {
    /// Reject values the session loop cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if !self.backend_url.starts_with("ws://") && !self.backend_url.starts_with("wss://") {
            bail!(
                "backend URL must use the ws:// or wss:// scheme, got '{}'",
                self.backend_url
            );
        }
        if self.meter_update_ms < MIN_METER_UPDATE_MS {
            bail!("meter update interval must be at least {MIN_METER_UPDATE_MS}ms");
        }
        if self.event_capacity < MIN_EVENT_CAPACITY {
            bail!("event capacity must be at least {MIN_EVENT_CAPACITY}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn flags_override_defaults() {
        let config = SessionConfig::parse_from([
            "sousvoice",
            "--backend-url",
            "wss://kitchen.example/session",
            "--always-listening",
            "--meter-update-ms",
            "120",
        ]);
        assert_eq!(config.backend_url, "wss://kitchen.example/session");
        assert!(config.always_listening);
        assert_eq!(config.meter_update_ms, 120);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_non_websocket_scheme() {
        let config = SessionConfig::parse_from([
            "sousvoice",
            "--backend-url",
            "https://kitchen.example/session",
        ]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_too_fast_meter_interval() {
        let config = SessionConfig::parse_from(["sousvoice", "--meter-update-ms", "1"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_tiny_event_capacity() {
        let config = SessionConfig::parse_from(["sousvoice", "--event-capacity", "2"]);
        assert!(config.validate().is_err());
    }
}
