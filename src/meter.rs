//! Audio level tracking so the UI meter reflects live input without flooding it.
//!
//! Levels are normalized into `[0, 1]` from frame RMS (microphone side) or
//! taken from remote-reported playback levels (speaker side). Publication is
//! rate-limited to a fixed interval; the limit bounds update volume only and
//! never gates a correctness-relevant state change.

use std::time::{Duration, Instant};

// Speech dynamics sit comfortably inside this window; quieter is floor,
// louder is clipped to full scale.
const METER_MIN_DB: f32 = -60.0;
const METER_MAX_DB: f32 = 0.0;

/// Normalized `[0, 1]` loudness with rate-limited publication.
#[derive(Debug)]
pub struct AudioLevelMeter {
    level: f32,
    publish_interval: Duration,
    last_published: Option<Instant>,
}

impl AudioLevelMeter {
    pub fn new(publish_interval: Duration) -> Self {
        Self {
            level: 0.0,
            publish_interval,
            last_published: None,
        }
    }

    /// Current normalized level. Meaningful only while capture or playback is
    /// active; callers must treat it as inactive otherwise.
    pub fn level(&self) -> f32 {
        self.level
    }

    /// Ingest a microphone frame; returns the level when a publish is due.
    pub fn ingest_frame(&mut self, samples: &[f32], now: Instant) -> Option<f32> {
        if samples.is_empty() {
            return None;
        }
        self.level = normalized_rms(samples);
        self.maybe_publish(now)
    }

    /// Ingest a remote-reported playback level; returns it when a publish is due.
    pub fn ingest_playback_level(&mut self, level: f32, now: Instant) -> Option<f32> {
        self.level = level.clamp(0.0, 1.0);
        self.maybe_publish(now)
    }

    /// Drop back to silence and re-arm immediate publication.
    pub fn reset(&mut self) {
        self.level = 0.0;
        self.last_published = None;
    }

    fn maybe_publish(&mut self, now: Instant) -> Option<f32> {
        let due = match self.last_published {
            Some(last) => now.duration_since(last) >= self.publish_interval,
            None => true,
        };
        if due {
            self.last_published = Some(now);
            Some(self.level)
        } else {
            None
        }
    }
}

/// Map frame RMS onto `[0, 1]` through the fixed dB window.
fn normalized_rms(samples: &[f32]) -> f32 {
    let energy: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    let rms = energy.sqrt().max(1e-6);
    let rms_db = 20.0 * rms.log10();
    ((rms_db - METER_MIN_DB) / (METER_MAX_DB - METER_MIN_DB)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meter() -> AudioLevelMeter {
        AudioLevelMeter::new(Duration::from_millis(80))
    }

    #[test]
    fn silence_maps_to_floor() {
        let samples = vec![0.0_f32; 160];
        assert_eq!(normalized_rms(&samples), 0.0);
    }

    #[test]
    fn full_scale_maps_to_one() {
        let samples = vec![1.0_f32; 160];
        assert!((normalized_rms(&samples) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn known_amplitude_lands_in_window() {
        // 0.5 amplitude is -6 dB, i.e. 54/60 of the window.
        let samples = vec![0.5_f32; 160];
        let expected = (20.0 * 0.5_f32.log10() - METER_MIN_DB) / (METER_MAX_DB - METER_MIN_DB);
        let got = normalized_rms(&samples);
        assert!((got - expected).abs() < 0.01, "got={got}, expected={expected}");
    }

    #[test]
    fn first_frame_publishes_immediately() {
        let mut meter = meter();
        let now = Instant::now();
        assert!(meter.ingest_frame(&[0.5; 64], now).is_some());
    }

    #[test]
    fn publishes_are_rate_limited() {
        let mut meter = meter();
        let start = Instant::now();
        assert!(meter.ingest_frame(&[0.5; 64], start).is_some());
        assert!(meter
            .ingest_frame(&[0.6; 64], start + Duration::from_millis(10))
            .is_none());
        assert!(meter
            .ingest_frame(&[0.6; 64], start + Duration::from_millis(90))
            .is_some());
    }

    #[test]
    fn suppressed_publish_still_updates_level() {
        let mut meter = meter();
        let start = Instant::now();
        meter.ingest_frame(&[0.01; 64], start);
        meter.ingest_frame(&[1.0; 64], start + Duration::from_millis(1));
        assert!((meter.level() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn playback_levels_are_clamped() {
        let mut meter = meter();
        let now = Instant::now();
        assert_eq!(meter.ingest_playback_level(3.5, now), Some(1.0));
        meter.reset();
        assert_eq!(meter.ingest_playback_level(-0.2, now), Some(0.0));
    }

    #[test]
    fn reset_rearms_immediate_publication() {
        let mut meter = meter();
        let start = Instant::now();
        meter.ingest_frame(&[0.5; 64], start);
        meter.reset();
        assert_eq!(meter.level(), 0.0);
        assert!(meter
            .ingest_frame(&[0.5; 64], start + Duration::from_millis(1))
            .is_some());
    }

    #[test]
    fn empty_frame_is_ignored() {
        let mut meter = meter();
        assert!(meter.ingest_frame(&[], Instant::now()).is_none());
        assert_eq!(meter.level(), 0.0);
    }
}
