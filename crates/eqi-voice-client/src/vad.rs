//! Silence-based voice activity detection.
//!
//! The detector consumes amplitude levels computed from whatever
//! cadence the audio backend delivers and decides, locally and without
//! server help, when the speaker has stopped talking.

use crate::config::VadConfig;
use tokio::time::Instant;

/// Root-mean-square level over the full sample window. No windowing
/// function is applied.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Tracks the last time voice was observed and signals auto-stop once a
/// configurable silence window elapses after a minimum speaking
/// duration. When disabled it still accepts observations but never
/// signals; when no observations arrive at all (analysis backend
/// unavailable) it degrades to a no-op rather than blocking capture.
#[derive(Clone, Debug)]
pub struct VoiceActivityDetector {
    cfg: VadConfig,
    enabled: bool,
    started_at: Instant,
    last_voice_at: Instant,
    fired: bool,
}

impl VoiceActivityDetector {
    pub fn new(cfg: VadConfig, enabled: bool, now: Instant) -> Self {
        Self {
            cfg: cfg.clamped(),
            enabled,
            started_at: now,
            last_voice_at: now,
            fired: false,
        }
    }

    /// Feed one amplitude level. Comparison is strict greater-than.
    pub fn observe_level(&mut self, level: f32, now: Instant) {
        if level > self.cfg.threshold {
            self.last_voice_at = now;
        }
    }

    /// Convenience: compute RMS of a sample window and feed it.
    pub fn observe_samples(&mut self, samples: &[f32], now: Instant) {
        self.observe_level(rms(samples), now);
    }

    /// Returns true exactly once, when the minimum speaking duration
    /// has elapsed and the trailing silence window has been exceeded.
    pub fn poll_auto_stop(&mut self, now: Instant) -> bool {
        if !self.enabled || self.fired {
            return false;
        }

        if now.duration_since(self.started_at) > self.cfg.min_speak
            && now.duration_since(self.last_voice_at) > self.cfg.silence
        {
            self.fired = true;
            return true;
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cfg() -> VadConfig {
        VadConfig::new(0.02, 1200, 1200)
    }

    fn at(start: Instant, ms: u64) -> Instant {
        start + Duration::from_millis(ms)
    }

    #[test]
    fn rms_of_constant_signal() {
        let samples = vec![0.5f32; 2048];
        assert!((rms(&samples) - 0.5).abs() < 1e-6);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn continuous_voice_never_stops() {
        let start = Instant::now();
        let mut vad = VoiceActivityDetector::new(cfg(), true, start);

        for ms in (0..30_000).step_by(16) {
            let now = at(start, ms);
            vad.observe_level(0.1, now);
            assert!(!vad.poll_auto_stop(now), "fired during continuous voice at {ms}ms");
        }
    }

    #[test]
    fn fires_after_min_speak_plus_silence() {
        let start = Instant::now();
        let mut vad = VoiceActivityDetector::new(cfg(), true, start);

        // Voice until t=1300ms, silence afterwards.
        for ms in (0..=1300).step_by(16) {
            let now = at(start, ms);
            vad.observe_level(0.1, now);
            assert!(!vad.poll_auto_stop(now));
        }
        for ms in (1316..2500).step_by(16) {
            let now = at(start, ms);
            vad.observe_level(0.001, now);
            assert!(!vad.poll_auto_stop(now), "fired early at {ms}ms");
        }

        // 1300ms of voice + 1200ms silence window.
        assert!(vad.poll_auto_stop(at(start, 2501)));
    }

    #[test]
    fn fires_at_most_once() {
        let start = Instant::now();
        let mut vad = VoiceActivityDetector::new(cfg(), true, start);
        assert!(vad.poll_auto_stop(at(start, 5000)));
        assert!(!vad.poll_auto_stop(at(start, 6000)));
    }

    #[test]
    fn disabled_detector_never_signals() {
        let start = Instant::now();
        let mut vad = VoiceActivityDetector::new(cfg(), false, start);
        assert!(!vad.poll_auto_stop(at(start, 60_000)));
    }

    #[test]
    fn level_at_threshold_counts_as_silence() {
        let start = Instant::now();
        let mut vad = VoiceActivityDetector::new(cfg(), true, start);
        // Strict greater-than: exactly the threshold is not voice.
        vad.observe_level(0.02, at(start, 2000));
        assert!(vad.poll_auto_stop(at(start, 2500)));
    }
}
