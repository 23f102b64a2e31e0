use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use songcraft_core::{InstrumentKind, PlaybackStyle, DEFAULT_BPM};
use songcraft_services::PlayerConfig;
use tracing::{debug, warn};

/// Persistent defaults; command-line flags override them per run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub player: PlayerConfig,
    pub playback: PlaybackDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackDefaults {
    pub tempo_bpm: u32,
    pub instrument: InstrumentKind,
    pub style: PlaybackStyle,
}

impl Default for PlaybackDefaults {
    fn default() -> Self {
        Self { tempo_bpm: DEFAULT_BPM, instrument: InstrumentKind::default(), style: PlaybackStyle::default() }
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("songcraft")
        .join("config.toml")
}

pub fn load_settings() -> Settings {
    let path = config_path();
    let Ok(s) = std::fs::read_to_string(&path) else {
        debug!(path = %path.display(), "No settings file, using defaults");
        return Settings::default();
    };
    match toml::from_str(&s) {
        Ok(settings) => settings,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Invalid settings file, using defaults");
            Settings::default()
        }
    }
}
