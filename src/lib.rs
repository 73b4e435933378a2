//! Voice session core for the SousChef cooking assistant.
//!
//! Owns the lifecycle of a realtime audio/text conversation with a remote
//! speech/LLM backend: connection state machine, transcript and chat-history
//! synchronization, audio-level tracking, and the command/event protocol used
//! while in session. Presentation, inventory, and recipe features live in
//! external collaborators that consume the snapshot this crate publishes.

pub mod capture;
pub mod config;
pub mod connection;
pub mod message;
pub mod meter;
pub mod session;
pub mod telemetry;
pub mod transcript;
pub mod transport;

pub use capture::{AudioCapture, FrameSender, NullCapture};
pub use config::SessionConfig;
pub use connection::ConnectionState;
pub use message::{Message, MessageId};
pub use session::{SessionFlags, SessionSnapshot, SessionStats, VoiceSessionManager};
pub use transcript::TranscriptEntry;
pub use transport::ws::WsTransport;
pub use transport::{ClientPayload, Transport, TransportEvent, TransportSender};
