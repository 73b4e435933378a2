//! Session counters for observability; never consulted for control flow.

use serde::Serialize;

/// Monotonic per-session counters, exposed in every snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Finalized user utterances.
    pub utterances: u32,
    /// User messages handed to the transport.
    pub messages_sent: u32,
    /// User messages appended locally without a transport hand-off.
    pub messages_unsent: u32,
    /// Assistant replies that finished streaming.
    pub assistant_replies: u32,
    /// Transport failures observed (open, mid-session, or send).
    pub transport_errors: u32,
}
