//! Serialized session core: all state lives here, mutated by exactly one loop.
//!
//! Inputs from every asynchronous source arrive as [`SessionEvent`]s on one
//! FIFO channel; `handle_event` applies them one at a time. Returning `true`
//! means observable state changed and the caller must publish a snapshot.
//! Epoch stamps on transport and capture events make cancellation safe: a
//! superseded attempt's events are discarded before they can touch state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::capture::{AudioCapture, FrameSender};
use crate::config::SessionConfig;
use crate::connection::{ConnectionEvent, ConnectionState, ConnectionStateMachine};
use crate::message::MessageLog;
use crate::meter::AudioLevelMeter;
use crate::transcript::TranscriptAssembler;
use crate::transport::{ClientPayload, Transport, TransportEvent, TransportSender};

use super::{
    AudioEvent, SessionCommand, SessionEvent, SessionFlags, SessionSnapshot, SessionStats,
};

pub(super) struct SessionState {
    machine: ConnectionStateMachine,
    assembler: TranscriptAssembler,
    meter: AudioLevelMeter,
    log: MessageLog,
    stats: SessionStats,
    is_listening: bool,
    is_speaking: bool,
    always_listening: bool,
    transport: Box<dyn Transport>,
    capture: Box<dyn AudioCapture>,
    transport_epoch: u64,
    capture_epoch: u64,
    subscribers: Vec<Sender<Arc<SessionSnapshot>>>,
    events_tx: Sender<SessionEvent>,
}

impl SessionState {
    pub(super) fn new(
        config: &SessionConfig,
        transport: Box<dyn Transport>,
        capture: Box<dyn AudioCapture>,
        events_tx: Sender<SessionEvent>,
    ) -> Self {
        Self {
            machine: ConnectionStateMachine::new(),
            assembler: TranscriptAssembler::new(),
            meter: AudioLevelMeter::new(Duration::from_millis(config.meter_update_ms)),
            log: MessageLog::new(),
            stats: SessionStats::default(),
            is_listening: false,
            is_speaking: false,
            always_listening: config.always_listening,
            transport,
            capture,
            transport_epoch: 0,
            capture_epoch: 0,
            subscribers: Vec::new(),
            events_tx,
        }
    }

    pub(super) fn snapshot(&self) -> SessionSnapshot {
        let level_active = self.is_listening || self.is_speaking;
        SessionSnapshot {
            connection: self.machine.state().clone(),
            flags: SessionFlags {
                is_listening: self.is_listening,
                is_speaking: self.is_speaking,
                always_listening: self.always_listening,
                audio_level: if level_active { self.meter.level() } else { 0.0 },
            },
            messages: self.log.messages().to_vec(),
            transcript: self.assembler.entries().to_vec(),
            partial_transcript: self.assembler.partial().map(str::to_string),
            stats: self.stats,
        }
    }

    /// Fan a published snapshot out to live subscribers, pruning dead ones.
    pub(super) fn publish(&mut self, snapshot: Arc<SessionSnapshot>) {
        self.subscribers
            .retain(|subscriber| subscriber.send(Arc::clone(&snapshot)).is_ok());
    }

    /// Apply one event. Returns true when observable state changed.
    pub(super) fn handle_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Command(command) => self.handle_command(command),
            SessionEvent::Transport { epoch, event } => self.handle_transport(epoch, event),
            SessionEvent::Audio(event) => self.handle_audio(event),
        }
    }

    /// Owner teardown mirrors an explicit disconnect.
    pub(super) fn teardown(&mut self) -> bool {
        self.disconnect()
    }

    fn handle_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Connect => self.connect(),
            SessionCommand::Disconnect => self.disconnect(),
            SessionCommand::StartListening => self.start_listening(),
            SessionCommand::StopListening => self.stop_listening(),
            SessionCommand::ToggleMute => {
                if self.is_listening {
                    self.stop_listening()
                } else {
                    self.start_listening()
                }
            }
            SessionCommand::SendMessage { text, image_data } => self.send_message(text, image_data),
            SessionCommand::SetAlwaysListening(enabled) => self.set_always_listening(enabled),
            SessionCommand::Subscribe(subscriber) => {
                // New subscribers get the current snapshot immediately so they
                // never start from a blank state.
                if subscriber.send(Arc::new(self.snapshot())).is_ok() {
                    self.subscribers.push(subscriber);
                }
                false
            }
            // The loop intercepts shutdown before it gets here.
            SessionCommand::Shutdown => false,
        }
    }

    fn connect(&mut self) -> bool {
        if matches!(
            self.machine.state(),
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            tracing::debug!(
                state = self.machine.state().label(),
                "connect ignored; attempt already active"
            );
            return false;
        }
        // A half-open previous attempt is cancelled before the new one starts.
        self.transport.close();
        self.transport_epoch += 1;
        let mut mutated = self.machine.apply(ConnectionEvent::Connect).is_some();
        let events = TransportSender::new(self.transport_epoch, self.events_tx.clone());
        if let Err(err) = self.transport.open(events) {
            tracing::warn!(error = %err, "transport open failed");
            self.stats.transport_errors += 1;
            mutated |= self
                .machine
                .apply(ConnectionEvent::TransportFailed {
                    reason: err.to_string(),
                })
                .is_some();
        }
        mutated
    }

    fn disconnect(&mut self) -> bool {
        // Fire-and-forget close; the epoch bump orphans the attempt so a late
        // open cannot resurrect it.
        self.transport.close();
        self.transport_epoch += 1;
        let mut mutated = self.leave_connected();
        mutated |= self.machine.apply(ConnectionEvent::Disconnect).is_some();
        mutated
    }

    fn start_listening(&mut self) -> bool {
        if !self.machine.state().is_connected() {
            tracing::debug!(
                state = self.machine.state().label(),
                "start listening ignored while not connected"
            );
            return false;
        }
        if self.is_listening {
            return false;
        }
        self.capture_epoch += 1;
        let frames = FrameSender::new(self.capture_epoch, self.events_tx.clone());
        match self.capture.start(frames) {
            Ok(()) => {
                self.is_listening = true;
                self.is_speaking = false;
                self.meter.reset();
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "capture start failed");
                false
            }
        }
    }

    fn stop_listening(&mut self) -> bool {
        if !self.is_listening {
            return false;
        }
        self.capture.stop();
        // Frames already in flight are stale from here on.
        self.capture_epoch += 1;
        if self.assembler.flush_partial().is_some() {
            self.stats.utterances += 1;
        }
        self.is_listening = false;
        self.meter.reset();
        true
    }

    fn send_message(&mut self, text: Option<String>, image_data: Option<Vec<u8>>) -> bool {
        if text.is_none() && image_data.is_none() {
            tracing::debug!("send ignored; message has no content");
            return false;
        }
        // Local append first, unconditionally. Only the network hand-off is
        // gated by connection state.
        let connected = self.machine.state().is_connected();
        let payload = ClientPayload::user_message(text.clone(), image_data.as_deref());
        let id = self.log.push_user(text, image_data, false);
        if connected {
            match self.transport.send(payload) {
                Ok(()) => {
                    self.log.mark_sent(id);
                    self.stats.messages_sent += 1;
                }
                Err(err) => {
                    // The appended message stands; the failure surfaces only
                    // through connection state.
                    self.stats.messages_unsent += 1;
                    self.fail_transport(err.to_string());
                }
            }
        } else {
            self.stats.messages_unsent += 1;
        }
        true
    }

    fn set_always_listening(&mut self, enabled: bool) -> bool {
        let mut mutated = self.always_listening != enabled;
        self.always_listening = enabled;
        if enabled {
            mutated |= self.rearm_listening();
        }
        mutated
    }

    fn handle_transport(&mut self, epoch: u64, event: TransportEvent) -> bool {
        if epoch != self.transport_epoch {
            tracing::debug!(event = ?event, "discarding transport event from superseded attempt");
            return false;
        }
        match event {
            TransportEvent::Opened => {
                let mut mutated = self.machine.apply(ConnectionEvent::TransportOpened).is_some();
                if mutated {
                    mutated |= self.rearm_listening();
                }
                mutated
            }
            TransportEvent::Failed { reason } => {
                let applied = self
                    .machine
                    .apply(ConnectionEvent::TransportFailed { reason })
                    .is_some();
                if applied {
                    self.stats.transport_errors += 1;
                }
                applied
            }
            TransportEvent::Closed => {
                self.transport.close();
                self.transport_epoch += 1;
                let mut mutated = self.leave_connected();
                mutated |= self.machine.apply(ConnectionEvent::TransportClosed).is_some();
                mutated
            }
            TransportEvent::Error { reason } => self.fail_transport(reason),
            TransportEvent::SpeechStarted => {
                if !self.is_listening {
                    tracing::debug!("speech start ignored while not listening");
                    return false;
                }
                self.assembler.speech_started();
                true
            }
            TransportEvent::PartialText { text } => {
                if !self.is_listening {
                    tracing::debug!("partial text ignored while not listening");
                    return false;
                }
                self.assembler.partial_text(&text);
                true
            }
            TransportEvent::FinalText { text } => {
                if !self.is_listening {
                    tracing::debug!("final text ignored while not listening");
                    return false;
                }
                let had_partial = self.assembler.partial().is_some();
                if self.assembler.final_text(&text).is_some() {
                    self.stats.utterances += 1;
                    true
                } else {
                    had_partial
                }
            }
            TransportEvent::SpeechEnded => {
                if !self.is_listening {
                    return false;
                }
                let had_partial = self.assembler.partial().is_some();
                if self.assembler.speech_ended().is_some() {
                    self.stats.utterances += 1;
                    true
                } else {
                    had_partial
                }
            }
            TransportEvent::AssistantTextChunk { text } => {
                self.log.append_assistant_chunk(&text);
                if !self.is_speaking {
                    // The remote party speaking displaces local capture.
                    self.stop_listening();
                    self.is_speaking = true;
                    self.meter.reset();
                }
                true
            }
            TransportEvent::AssistantTextDone => {
                let mut mutated = false;
                if let Some(text) = self.log.finalize_draft() {
                    self.assembler.push_assistant(&text);
                    self.stats.assistant_replies += 1;
                    mutated = true;
                }
                mutated | self.finish_speaking()
            }
        }
    }

    fn handle_audio(&mut self, event: AudioEvent) -> bool {
        match event {
            AudioEvent::MicFrame { epoch, samples } => {
                if epoch != self.capture_epoch {
                    tracing::debug!("discarding microphone frame from stopped capture");
                    return false;
                }
                if !self.is_listening {
                    return false;
                }
                if self.machine.state().is_connected() {
                    if let Err(err) = self.transport.send(ClientPayload::audio_frame(&samples)) {
                        return self.fail_transport(err.to_string());
                    }
                }
                self.meter.ingest_frame(&samples, Instant::now()).is_some()
            }
            AudioEvent::PlaybackLevel { level } => {
                if !self.is_speaking {
                    return false;
                }
                self.meter
                    .ingest_playback_level(level, Instant::now())
                    .is_some()
            }
            AudioEvent::PlaybackFinished => self.finish_speaking(),
        }
    }

    /// Mid-session transport failure: close, orphan the attempt, surface as
    /// connection state only.
    fn fail_transport(&mut self, reason: String) -> bool {
        self.transport.close();
        self.transport_epoch += 1;
        let mut mutated = self.leave_connected();
        let applied = self
            .machine
            .apply(ConnectionEvent::TransportError { reason })
            .is_some();
        if applied {
            self.stats.transport_errors += 1;
        }
        mutated | applied
    }

    /// Shared teardown for any exit from the connected state.
    fn leave_connected(&mut self) -> bool {
        let mut mutated = self.stop_listening();
        if self.is_speaking {
            self.is_speaking = false;
            self.meter.reset();
            mutated = true;
        }
        if self.log.finalize_draft().is_some() {
            // A reply cut off mid-stream keeps its text but stops being a
            // draft; it never reaches the transcript.
            mutated = true;
        }
        mutated
    }

    fn finish_speaking(&mut self) -> bool {
        if !self.is_speaking {
            return false;
        }
        self.is_speaking = false;
        self.meter.reset();
        self.rearm_listening();
        true
    }

    fn rearm_listening(&mut self) -> bool {
        if self.always_listening && self.machine.state().is_connected() && !self.is_listening {
            self.start_listening()
        } else {
            false
        }
    }
}
