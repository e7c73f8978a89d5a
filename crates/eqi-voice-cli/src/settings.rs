//! Persisted CLI preferences, merged under command-line flags.

use anyhow::{Context, Result};
use eqi_voice_client::config::{
    DEFAULT_HISTORY_TURNS, DEFAULT_MIN_SPEAK_MS, DEFAULT_SILENCE_MS, DEFAULT_VAD_THRESHOLD,
};
use eqi_voice_client::{SessionConfig, VadConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub history_turns: u32,
    pub auto_stop: bool,
    pub mic_device: Option<String>,
    pub objective_code: Option<String>,
    pub vad_threshold: f32,
    pub min_speak_ms: u64,
    pub silence_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            history_turns: DEFAULT_HISTORY_TURNS,
            auto_stop: true,
            mic_device: None,
            objective_code: None,
            vad_threshold: DEFAULT_VAD_THRESHOLD,
            min_speak_ms: DEFAULT_MIN_SPEAK_MS,
            silence_ms: DEFAULT_SILENCE_MS,
        }
    }
}

impl Settings {
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("eqi-voice").join("settings.toml"))
    }

    /// Read the settings file; a missing or unreadable file falls back
    /// to defaults so the CLI always starts.
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            return Self::default();
        };
        let Ok(raw) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match toml::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring malformed settings file");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::path().context("no user config directory")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(&path, raw).with_context(|| format!("writing {}", path.display()))?;
        eprintln!("saved settings to {}", path.display());
        Ok(())
    }

    pub fn session_config(&self, session_id: i64) -> SessionConfig {
        let mut cfg = SessionConfig::new(self.base_url.clone(), session_id)
            .history_turns(self.history_turns)
            .auto_stop(self.auto_stop)
            .vad(VadConfig::new(self.vad_threshold, self.min_speak_ms, self.silence_ms));
        if let Some(code) = &self.objective_code {
            cfg = cfg.objective_code(code.clone());
        }
        if let Some(device) = &self.mic_device {
            cfg = cfg.mic_device(device.clone());
        }
        cfg
    }
}
