//! User settings persistence.
//!
//! Preferences that outlive a single session. Images are never persisted,
//! only the choices the user made about them.

use crate::aspect::AspectRatio;
use crate::config::Config;
use crate::error::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// User-configurable settings persisted between sessions.
///
/// Settings are stored as JSON in the user's config directory
/// (e.g., `~/.config/image-cropper/settings.json` on Linux).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Ratio selected when a new image is uploaded.
    pub aspect: AspectRatio,
    /// JPEG quality override; `None` keeps the configured value.
    #[serde(default)]
    pub jpeg_quality: Option<u8>,
}

impl Settings {
    /// Returns the path to the settings file.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "image-cropper").map(|dirs| {
            let config_dir = dirs.config_dir();
            if !config_dir.exists() {
                let _ = fs::create_dir_all(config_dir);
            }
            config_dir.join("settings.json")
        })
    }

    /// Loads settings from disk, falling back to defaults if not found.
    pub fn load(config: &Config) -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path, config))
            .unwrap_or_else(|| Self::with_defaults(config))
    }

    /// Loads settings from an explicit path.
    ///
    /// A missing or unreadable file yields the defaults.
    pub fn load_from(path: &Path, config: &Config) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed settings file");
                Self::with_defaults(config)
            }),
            Err(_) => Self::with_defaults(config),
        }
    }

    /// Creates default settings from the loaded configuration.
    pub fn with_defaults(config: &Config) -> Self {
        Self {
            aspect: config.default_aspect,
            jpeg_quality: None,
        }
    }

    /// Persists settings to disk.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save(&self) -> Result<()> {
        if let Some(path) = Self::config_path() {
            self.save_to(&path)?;
        }
        Ok(())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Applies the persisted overrides on top of `config`.
    pub fn apply(&self, config: &Config) -> Config {
        let mut merged = config.clone();
        merged.default_aspect = self.aspect;
        if let Some(quality) = self.jpeg_quality.filter(|q| (1..=100).contains(q)) {
            merged.jpeg_quality = quality;
        }
        merged
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::with_defaults(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            aspect: AspectRatio::Landscape,
            jpeg_quality: Some(80),
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path, &Config::default()), settings);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Settings::load_from(&dir.path().join("nope.json"), &Config::default());
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load_from(&path, &Config::default()), Settings::default());
    }

    #[test]
    fn apply_overrides_config() {
        let settings = Settings {
            aspect: AspectRatio::Square,
            jpeg_quality: Some(60),
        };
        let merged = settings.apply(&Config::default());
        assert_eq!(merged.default_aspect, AspectRatio::Square);
        assert_eq!(merged.jpeg_quality, 60);
    }

    #[test]
    fn out_of_range_quality_is_ignored() {
        let settings = Settings {
            aspect: AspectRatio::Square,
            jpeg_quality: Some(0),
        };
        assert_eq!(settings.apply(&Config::default()).jpeg_quality, 92);
    }
}
