use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;

/// Persistent playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Speed multiplier, 1.0 = real time
    pub playback_rate: f64,
    /// Debounce window for scrub requests
    pub scrub_wait_secs: f64,
    /// Sleep between timing-loop iterations
    pub idle_sleep_ms: u64,
    /// Wrap to tick 0 at the end of the stream instead of holding
    pub loop_playback: bool,
    /// Stream made active when nothing was loaded before
    pub default_stream: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            playback_rate: 1.0,
            scrub_wait_secs: 0.2,
            idle_sleep_ms: 1,
            loop_playback: false,
            default_stream: 0,
        }
    }
}

impl PlaybackConfig {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("scene-replay").join("playback.json"))
    }

    /// Load from the user config directory, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring settings at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        match Self::config_path() {
            Some(path) => self.save_to(path),
            None => {
                warn!("No config directory available, settings not saved");
                Ok(())
            }
        }
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("playback.json");

        let config = PlaybackConfig {
            playback_rate: 0.5,
            loop_playback: true,
            ..Default::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(PlaybackConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("playback.json");
        fs::write(&path, r#"{ "scrub_wait_secs": 0.5 }"#).unwrap();

        let config = PlaybackConfig::load_from(&path).unwrap();
        assert_eq!(config.scrub_wait_secs, 0.5);
        assert_eq!(config.playback_rate, 1.0);
        assert_eq!(config.idle_sleep_ms, 1);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("playback.json");
        fs::write(&path, "not json").unwrap();
        assert!(PlaybackConfig::load_from(&path).is_err());
    }
}
