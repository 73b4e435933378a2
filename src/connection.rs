//! Connection lifecycle state machine so send legality has a single authority.
//!
//! Every other component consults this state to decide whether talking to the
//! backend is currently legal. Transitions outside the table below are logged
//! and ignored rather than treated as faults; they indicate a stale or
//! out-of-order event, not a broken session.

use serde::Serialize;

/// Lifecycle of the backend connection.
///
/// Exactly one value is active at any instant. `Error` is terminal until a new
/// connect request arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection and none in flight.
    Disconnected,
    /// Connect issued, waiting for the transport to open or fail.
    Connecting,
    /// Transport open; sending is legal.
    Connected,
    /// Transport failed; retry-eligible via a new connect request.
    Error {
        /// Human-readable failure description.
        message: String,
    },
}

impl ConnectionState {
    /// Whether sending over the transport is currently legal.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Compact label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error { .. } => "error",
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// Lifecycle inputs: user intent plus transport callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connect,
    Disconnect,
    TransportOpened,
    TransportFailed { reason: String },
    TransportClosed,
    TransportError { reason: String },
}

impl ConnectionEvent {
    fn label(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::TransportOpened => "transport_opened",
            Self::TransportFailed { .. } => "transport_failed",
            Self::TransportClosed => "transport_closed",
            Self::TransportError { .. } => "transport_error",
        }
    }
}

/// Single owner of the [`ConnectionState`] value.
///
/// The machine itself is synchronous; serialization of callers is the session
/// loop's job.
#[derive(Debug, Default)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn with_state(state: ConnectionState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Apply a lifecycle event.
    ///
    /// Returns the new state when the event matched a legal transition, `None`
    /// when it was ignored. Explicit disconnect always wins, including over an
    /// in-flight connect attempt.
    pub fn apply(&mut self, event: ConnectionEvent) -> Option<ConnectionState> {
        use ConnectionEvent as E;
        use ConnectionState as S;

        let next = match (&self.state, &event) {
            (S::Disconnected, E::Connect) => Some(S::Connecting),
            (S::Connecting, E::TransportOpened) => Some(S::Connected),
            (S::Connecting, E::TransportFailed { reason }) => Some(S::Error {
                message: reason.clone(),
            }),
            (S::Connected, E::TransportClosed) => Some(S::Disconnected),
            (S::Connected, E::TransportError { reason }) => Some(S::Error {
                message: reason.clone(),
            }),
            (S::Connecting | S::Connected | S::Error { .. }, E::Disconnect) => {
                Some(S::Disconnected)
            }
            (S::Error { .. }, E::Connect) => Some(S::Connecting),
            _ => None,
        };

        match next {
            Some(next) => {
                self.state = next.clone();
                Some(next)
            }
            None => {
                tracing::debug!(
                    state = self.state.label(),
                    event = event.label(),
                    "connection event has no legal transition; ignoring"
                );
                None
            }
        }
    }
}
