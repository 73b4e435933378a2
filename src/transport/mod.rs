//! Transport contract so the session core never touches a socket directly.
//!
//! Defines the abstract bidirectional channel to the remote voice/LLM backend:
//! the trait the session loop drives, the inbound event vocabulary, and the
//! outbound payloads. Wire frames are tagged JSON; binary content (images,
//! PCM) travels base64-encoded inside text frames.

pub mod ws;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use crate::session::SessionEvent;

/// Events arriving from the backend.
///
/// Serialized as JSON with an `"event"` tag field for type discrimination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransportEvent {
    /// The connection attempt succeeded.
    Opened,
    /// The connection attempt failed before opening.
    Failed {
        /// Human-readable failure description.
        reason: String,
    },
    /// The recognizer detected the start of user speech.
    SpeechStarted,
    /// In-progress recognition text; supersedes any prior partial.
    PartialText { text: String },
    /// Final recognition text for the current utterance.
    FinalText { text: String },
    /// The recognizer detected the end of user speech.
    SpeechEnded,
    /// A streamed fragment of the assistant reply.
    AssistantTextChunk { text: String },
    /// The assistant reply finished streaming.
    AssistantTextDone,
    /// The backend closed the connection normally.
    Closed,
    /// The connection failed mid-session.
    Error {
        /// Human-readable failure description.
        reason: String,
    },
}

/// Payloads the session core sends to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientPayload {
    /// A user-authored chat message.
    UserMessage {
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        /// Base64-encoded image bytes.
        #[serde(skip_serializing_if = "Option::is_none")]
        image: Option<String>,
    },
    /// One microphone frame as base64 PCM16LE.
    AudioFrame { pcm: String },
}

impl ClientPayload {
    pub fn user_message(text: Option<String>, image_data: Option<&[u8]>) -> Self {
        Self::UserMessage {
            text,
            image: image_data.map(|bytes| BASE64.encode(bytes)),
        }
    }

    pub fn audio_frame(samples: &[f32]) -> Self {
        let mut pcm = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            let quantized = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
            pcm.extend_from_slice(&quantized.to_le_bytes());
        }
        Self::AudioFrame {
            pcm: BASE64.encode(pcm),
        }
    }
}

/// Epoch-stamped path from a transport into the session loop.
///
/// Each connect attempt gets a fresh epoch; events from a superseded attempt
/// are discarded at the loop's front door, so a cancelled connect can never
/// resurrect itself with a late open.
#[derive(Debug, Clone)]
pub struct TransportSender {
    epoch: u64,
    tx: Sender<SessionEvent>,
}

impl TransportSender {
    pub(crate) fn new(epoch: u64, tx: Sender<SessionEvent>) -> Self {
        Self { epoch, tx }
    }

    /// Deliver an event; returns false once the session is gone.
    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx
            .send(SessionEvent::Transport {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }
}

/// The abstract bidirectional channel to the backend.
///
/// `open` must return immediately; completion arrives as an `Opened` or
/// `Failed` event on the supplied sender. `close` is fire-and-forget: the
/// caller does not wait for the peer to acknowledge.
pub trait Transport: Send {
    fn open(&mut self, events: TransportSender) -> anyhow::Result<()>;
    fn send(&mut self, payload: ClientPayload) -> anyhow::Result<()>;
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_round_trip_through_tagged_json() {
        let event = TransportEvent::PartialText {
            text: "toma".into(),
        };
        let json = serde_json::to_string(&event).expect("serialize");
        assert!(json.contains("\"event\":\"partial_text\""));
        let back: TransportEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, event);
    }

    #[test]
    fn unit_events_carry_only_the_tag() {
        let json = serde_json::to_string(&TransportEvent::SpeechEnded).expect("serialize");
        assert_eq!(json, "{\"event\":\"speech_ended\"}");
    }

    #[test]
    fn user_message_encodes_image_as_base64() {
        let payload = ClientPayload::user_message(Some("what is this?".into()), Some(&[1, 2, 3]));
        let json = serde_json::to_string(&payload).expect("serialize");
        assert!(json.contains("\"type\":\"user_message\""));
        assert!(json.contains(&BASE64.encode([1u8, 2, 3])));
    }

    #[test]
    fn user_message_omits_absent_fields() {
        let payload = ClientPayload::user_message(Some("hi".into()), None);
        let json = serde_json::to_string(&payload).expect("serialize");
        assert!(!json.contains("image"));
    }

    #[test]
    fn audio_frame_quantizes_full_scale() {
        let payload = ClientPayload::audio_frame(&[1.0, -1.0, 0.0]);
        let ClientPayload::AudioFrame { pcm } = payload else {
            panic!("expected audio frame");
        };
        let bytes = BASE64.decode(pcm).expect("base64");
        assert_eq!(bytes.len(), 6);
        let first = i16::from_le_bytes([bytes[0], bytes[1]]);
        let second = i16::from_le_bytes([bytes[2], bytes[3]]);
        let third = i16::from_le_bytes([bytes[4], bytes[5]]);
        assert_eq!(first, i16::MAX);
        assert_eq!(second, -i16::MAX);
        assert_eq!(third, 0);
    }

    #[test]
    fn oversized_samples_are_clamped() {
        let payload = ClientPayload::audio_frame(&[7.0]);
        let ClientPayload::AudioFrame { pcm } = payload else {
            panic!("expected audio frame");
        };
        let bytes = BASE64.decode(pcm).expect("base64");
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MAX);
    }
}
