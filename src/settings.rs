use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::looper::ExportFormat;

/// Returns the path to the settings file: `~/.config/loopdub/settings.json`
pub fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("loopdub");
    path.push("settings.json");
    path
}

/// Persisted engine settings.
///
/// Serialized as JSON to the platform config directory.
/// Fields use `#[serde(default)]` so that adding new settings
/// won't break existing config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    // Loop format
    pub sample_rate: u32,
    pub channels: usize,
    pub max_loop_seconds: f64,

    // Position tracking
    pub recording_tick_ms: u64,
    pub playback_tick_hz: f64,

    // Capture
    pub input_device: Option<String>,
    pub input_gain: f32,
    pub capture_headroom_seconds: f64,

    // Export / display
    pub export_format: ExportFormat,
    pub waveform_points: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            max_loop_seconds: 60.0,

            recording_tick_ms: 50,
            playback_tick_hz: 60.0,

            input_device: None,
            input_gain: 1.0,
            capture_headroom_seconds: 2.0,

            export_format: ExportFormat::Pcm16,
            waveform_points: 512,
        }
    }
}

impl EngineSettings {
    /// Load settings from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        Self::load_from(&settings_path())
    }

    pub fn load_from(path: &Path) -> Self {
        let settings: Self = match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse settings ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::info!("No settings file found ({}), using defaults", e);
                Self::default()
            }
        };

        if let Err(e) = settings.validate() {
            log::warn!("Invalid settings ({}), using defaults", e);
            return Self::default();
        }
        settings
    }

    /// Save settings to disk as pretty JSON.
    pub fn save(&self) {
        self.save_to(&settings_path())
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create config directory: {}", e);
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::warn!("Failed to write settings: {}", e);
                }
            }
            Err(e) => {
                log::warn!("Failed to serialize settings: {}", e);
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample_rate must be positive".into());
        }
        if self.channels == 0 {
            return Err("channels must be positive".into());
        }
        if !(self.max_loop_seconds > 0.0) {
            return Err("max_loop_seconds must be positive".into());
        }
        if self.recording_tick_ms == 0 {
            return Err("recording_tick_ms must be positive".into());
        }
        if !(self.playback_tick_hz > 0.0) || !self.playback_tick_hz.is_finite() {
            return Err("playback_tick_hz must be positive".into());
        }
        if !(self.input_gain >= 0.0) || !self.input_gain.is_finite() {
            return Err("input_gain must be a finite non-negative factor".into());
        }
        if !(self.capture_headroom_seconds >= 0.0) {
            return Err("capture_headroom_seconds must not be negative".into());
        }
        Ok(())
    }

    pub fn recording_tick(&self) -> Duration {
        Duration::from_millis(self.recording_tick_ms.max(1))
    }

    pub fn playback_tick(&self) -> Duration {
        if self.playback_tick_hz > 0.0 && self.playback_tick_hz.is_finite() {
            Duration::from_secs_f64(1.0 / self.playback_tick_hz)
        } else {
            Duration::from_secs_f64(1.0 / 60.0)
        }
    }

    /// Longest pass the capture ring must be able to hold
    pub fn capture_capacity_seconds(&self) -> f64 {
        self.max_loop_seconds + self.capture_headroom_seconds
    }
}
