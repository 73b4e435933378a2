//! Voice session orchestration so every mutation flows through one owner.
//!
//! [`VoiceSessionManager`] is the only component presentation collaborators
//! talk to. Commands, transport events, and audio frames all funnel into a
//! single FIFO channel drained by a dedicated session thread; each mutation
//! publishes exactly one immutable [`SessionSnapshot`], so subscribers never
//! observe a torn intermediate state.

mod state;
mod stats;

pub use stats::SessionStats;

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use serde::Serialize;

use crate::capture::AudioCapture;
use crate::config::SessionConfig;
use crate::connection::ConnectionState;
use crate::message::Message;
use crate::transcript::TranscriptEntry;
use crate::transport::{Transport, TransportEvent};

use state::SessionState;

/// Mutually-exclusive activity flags plus the live audio level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SessionFlags {
    /// Local microphone capture is active.
    pub is_listening: bool,
    /// The assistant is replying (streaming text and/or playing audio).
    pub is_speaking: bool,
    /// Listening re-arms automatically after each assistant turn.
    pub always_listening: bool,
    /// Normalized `[0, 1]`; held at `0.0` whenever neither flag is active.
    pub audio_level: f32,
}

/// One consistent view of the session, published atomically per mutation.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub flags: SessionFlags,
    /// Chat history in display order.
    pub messages: Vec<Message>,
    /// Finalized transcript entries in display order.
    pub transcript: Vec<TranscriptEntry>,
    /// In-progress user speech, non-nil only while listening.
    pub partial_transcript: Option<String>,
    pub stats: SessionStats,
}

/// Commands accepted by the session loop.
#[derive(Debug)]
pub enum SessionCommand {
    Connect,
    Disconnect,
    StartListening,
    StopListening,
    ToggleMute,
    SendMessage {
        text: Option<String>,
        image_data: Option<Vec<u8>>,
    },
    SetAlwaysListening(bool),
    Subscribe(Sender<Arc<SessionSnapshot>>),
    Shutdown,
}

/// Observations from the platform audio collaborator.
#[derive(Debug)]
pub enum AudioEvent {
    /// One captured microphone frame, stamped with its capture span.
    MicFrame { epoch: u64, samples: Vec<f32> },
    /// Remote-reported playback loudness while the assistant speaks.
    PlaybackLevel { level: f32 },
    /// Speaker playback of the assistant reply finished.
    PlaybackFinished,
}

/// Everything that can enter the serialized session loop.
#[derive(Debug)]
pub enum SessionEvent {
    Command(SessionCommand),
    Transport { epoch: u64, event: TransportEvent },
    Audio(AudioEvent),
}

/// Handle to one voice session.
///
/// Owns the session thread; dropping the handle disconnects and joins it.
/// All methods return immediately; effects surface through snapshots.
pub struct VoiceSessionManager {
    events_tx: Sender<SessionEvent>,
    latest: Arc<Mutex<Arc<SessionSnapshot>>>,
    worker: Option<JoinHandle<()>>,
}

impl VoiceSessionManager {
    /// Validate the config and start the session thread.
    pub fn spawn(
        config: SessionConfig,
        transport: Box<dyn Transport>,
        capture: Box<dyn AudioCapture>,
    ) -> Result<Self> {
        config.validate()?;
        let (events_tx, events_rx) = bounded(config.event_capacity);
        let state = SessionState::new(&config, transport, capture, events_tx.clone());
        let latest = Arc::new(Mutex::new(Arc::new(state.snapshot())));
        let latest_for_loop = Arc::clone(&latest);
        let worker = thread::Builder::new()
            .name("sousvoice-session".into())
            .spawn(move || run_session_loop(state, events_rx, &latest_for_loop))
            .context("failed to spawn session thread")?;
        Ok(Self {
            events_tx,
            latest,
            worker: Some(worker),
        })
    }

    pub fn connect(&self) {
        self.send_command(SessionCommand::Connect);
    }

    pub fn disconnect(&self) {
        self.send_command(SessionCommand::Disconnect);
    }

    pub fn start_listening(&self) {
        self.send_command(SessionCommand::StartListening);
    }

    pub fn stop_listening(&self) {
        self.send_command(SessionCommand::StopListening);
    }

    pub fn toggle_mute(&self) {
        self.send_command(SessionCommand::ToggleMute);
    }

    /// Append a user message locally and forward it when connected.
    pub fn send_message(&self, text: Option<String>, image_data: Option<Vec<u8>>) {
        self.send_command(SessionCommand::SendMessage { text, image_data });
    }

    pub fn set_always_listening(&self, enabled: bool) {
        self.send_command(SessionCommand::SetAlwaysListening(enabled));
    }

    /// Subscribe to snapshot updates; the current snapshot arrives first.
    pub fn subscribe(&self) -> Receiver<Arc<SessionSnapshot>> {
        let (tx, rx) = unbounded();
        self.send_command(SessionCommand::Subscribe(tx));
        rx
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        match self.latest.lock() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Speaker collaborator: report a playback loudness sample.
    pub fn notify_playback_level(&self, level: f32) {
        let _ = self
            .events_tx
            .send(SessionEvent::Audio(AudioEvent::PlaybackLevel { level }));
    }

    /// Speaker collaborator: report that playback finished.
    pub fn notify_playback_finished(&self) {
        let _ = self
            .events_tx
            .send(SessionEvent::Audio(AudioEvent::PlaybackFinished));
    }

    /// Disconnect, stop the session thread, and wait for it to exit.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn send_command(&self, command: SessionCommand) {
        if self.events_tx.send(SessionEvent::Command(command)).is_err() {
            tracing::debug!("session loop is gone; dropping command");
        }
    }

    fn shutdown_inner(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.send_command(SessionCommand::Shutdown);
        if worker.join().is_err() {
            tracing::warn!("session thread panicked during shutdown");
        }
    }
}

impl Drop for VoiceSessionManager {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

fn run_session_loop(
    mut state: SessionState,
    events_rx: Receiver<SessionEvent>,
    latest: &Arc<Mutex<Arc<SessionSnapshot>>>,
) {
    while let Ok(event) = events_rx.recv() {
        if matches!(event, SessionEvent::Command(SessionCommand::Shutdown)) {
            if state.teardown() {
                publish(&mut state, latest);
            }
            break;
        }
        if state.handle_event(event) {
            publish(&mut state, latest);
        }
    }
}

fn publish(state: &mut SessionState, latest: &Arc<Mutex<Arc<SessionSnapshot>>>) {
    let snapshot = Arc::new(state.snapshot());
    match latest.lock() {
        Ok(mut guard) => *guard = Arc::clone(&snapshot),
        Err(poisoned) => *poisoned.into_inner() = Arc::clone(&snapshot),
    }
    state.publish(snapshot);
}
