use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_VAD_THRESHOLD: f32 = 0.02;
pub const MIN_VAD_THRESHOLD: f32 = 0.001;
pub const MAX_VAD_THRESHOLD: f32 = 0.2;
pub const DEFAULT_MIN_SPEAK_MS: u64 = 1200;
pub const DEFAULT_SILENCE_MS: u64 = 1200;
pub const MIN_SILENCE_MS: u64 = 200;
pub const DEFAULT_HISTORY_TURNS: u32 = 8;
pub const MAX_HISTORY_TURNS: u32 = 20;

/// Voice-activity detection tuning. Values are clamped on construction
/// and read once per session start; a running session never observes
/// configuration changes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VadConfig {
    /// Minimum RMS amplitude counted as voice.
    pub threshold: f32,
    /// Elapsed time before auto-stop becomes eligible.
    pub min_speak: Duration,
    /// Required trailing silence before auto-stop fires.
    pub silence: Duration,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_VAD_THRESHOLD,
            min_speak: Duration::from_millis(DEFAULT_MIN_SPEAK_MS),
            silence: Duration::from_millis(DEFAULT_SILENCE_MS),
        }
    }
}

impl VadConfig {
    pub fn new(threshold: f32, min_speak_ms: u64, silence_ms: u64) -> Self {
        Self {
            threshold,
            min_speak: Duration::from_millis(min_speak_ms),
            silence: Duration::from_millis(silence_ms),
        }
        .clamped()
    }

    pub fn clamped(mut self) -> Self {
        if !self.threshold.is_finite() {
            self.threshold = DEFAULT_VAD_THRESHOLD;
        }
        self.threshold = self.threshold.clamp(MIN_VAD_THRESHOLD, MAX_VAD_THRESHOLD);
        self.silence = self.silence.max(Duration::from_millis(MIN_SILENCE_MS));
        self
    }
}

/// Everything a [`crate::DuplexTranscriptSession`] needs, loaded at the
/// process boundary and passed in explicitly. A session identity is
/// required: without one the session may not start.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Backend base endpoint, `http(s)://` or `ws(s)://`.
    pub base_url: String,
    /// Opaque learner session identity.
    pub session_id: i64,
    /// Chat-history turn count sent to the backend, clamped to [1, 20].
    pub history_turns: u32,
    pub objective_code: Option<String>,
    /// When false the VAD still runs but never signals auto-stop, and
    /// the stale-partial watchdog is disarmed.
    pub auto_stop: bool,
    /// Preferred input device name; `None` means host default.
    pub mic_device: Option<String>,
    pub vad: VadConfig,
}

impl SessionConfig {
    pub fn new(base_url: impl Into<String>, session_id: i64) -> Self {
        Self {
            base_url: base_url.into(),
            session_id,
            history_turns: DEFAULT_HISTORY_TURNS,
            objective_code: None,
            auto_stop: true,
            mic_device: None,
            vad: VadConfig::default(),
        }
    }

    pub fn history_turns(mut self, turns: u32) -> Self {
        self.history_turns = turns.clamp(1, MAX_HISTORY_TURNS);
        self
    }

    pub fn objective_code(mut self, code: impl Into<String>) -> Self {
        self.objective_code = Some(code.into());
        self
    }

    pub fn auto_stop(mut self, enabled: bool) -> Self {
        self.auto_stop = enabled;
        self
    }

    pub fn mic_device(mut self, name: impl Into<String>) -> Self {
        self.mic_device = Some(name.into());
        self
    }

    pub fn vad(mut self, vad: VadConfig) -> Self {
        self.vad = vad.clamped();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vad_threshold_is_clamped() {
        assert_eq!(VadConfig::new(5.0, 1200, 1200).threshold, MAX_VAD_THRESHOLD);
        assert_eq!(VadConfig::new(0.0, 1200, 1200).threshold, MIN_VAD_THRESHOLD);
        assert_eq!(VadConfig::new(f32::NAN, 1200, 1200).threshold, DEFAULT_VAD_THRESHOLD);
    }

    #[test]
    fn silence_has_a_floor() {
        let cfg = VadConfig::new(0.02, 1200, 50);
        assert_eq!(cfg.silence, Duration::from_millis(MIN_SILENCE_MS));
    }

    #[test]
    fn history_turns_are_clamped() {
        let cfg = SessionConfig::new("http://localhost:8000", 7).history_turns(0);
        assert_eq!(cfg.history_turns, 1);
        let cfg = SessionConfig::new("http://localhost:8000", 7).history_turns(99);
        assert_eq!(cfg.history_turns, MAX_HISTORY_TURNS);
    }
}
