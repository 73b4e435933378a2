//! Microphone capture contract so platform audio stays outside the session core.
//!
//! The session loop drives capture through this trait and consumes only
//! epoch-stamped frames. `stop` must halt promptly; frames already in flight
//! when the stop lands are discarded by the loop via the epoch check rather
//! than by the device.

use crossbeam_channel::Sender;

use crate::session::{AudioEvent, SessionEvent};

/// Epoch-stamped path from a capture device into the session loop.
///
/// Each listening span gets a fresh epoch; frames from a stopped span are
/// discarded before they can touch the meter or the transport.
#[derive(Debug, Clone)]
pub struct FrameSender {
    epoch: u64,
    tx: Sender<SessionEvent>,
}

impl FrameSender {
    pub(crate) fn new(epoch: u64, tx: Sender<SessionEvent>) -> Self {
        Self { epoch, tx }
    }

    /// Deliver one mono PCM frame; returns false once the session is gone.
    pub fn send(&self, samples: Vec<f32>) -> bool {
        self.tx
            .send(SessionEvent::Audio(AudioEvent::MicFrame {
                epoch: self.epoch,
                samples,
            }))
            .is_ok()
    }
}

/// Start/stop contract for a microphone backend.
pub trait AudioCapture: Send {
    /// Begin delivering frames on `frames`. Must return promptly; capture runs
    /// on the device's own background activity.
    fn start(&mut self, frames: FrameSender) -> anyhow::Result<()>;

    /// Stop capture promptly. Idempotent.
    fn stop(&mut self);
}

/// Capture backend that produces no frames.
///
/// Used for headless operation (text-only sessions, the probe binary) where
/// listening state still needs to toggle without a microphone present.
#[derive(Debug, Default)]
pub struct NullCapture;

impl AudioCapture for NullCapture {
    fn start(&mut self, _frames: FrameSender) -> anyhow::Result<()> {
        Ok(())
    }

    fn stop(&mut self) {}
}
