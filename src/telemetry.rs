//! Optional local telemetry logging used for debugging and session triage.

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_subscriber::fmt::time::UtcTime;

use crate::config::SessionConfig;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Trace log destination; the env override wins over the temp-dir default.
pub fn trace_log_path() -> PathBuf {
    env::var("SOUSVOICE_TRACE_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("sousvoice_trace.jsonl"))
}

#[inline]
fn tracing_enabled(config: &SessionConfig) -> bool {
    config.logs && !config.no_logs
}

fn init_tracing_once(config: &SessionConfig, once: &OnceLock<()>) {
    if !tracing_enabled(config) {
        return;
    }

    let _ = once.get_or_init(|| {
        let path = trace_log_path();
        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => file,
            Err(_) => return,
        };
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(file)
            .with_current_span(false)
            .with_span_list(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Install the JSON trace subscriber when config enables it. Idempotent.
pub fn init_tracing(config: &SessionConfig) {
    init_tracing_once(config, &TRACING_INIT);
}
