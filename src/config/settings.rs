//! Bridge settings, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for audio capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz requested from the input device and used when the
    /// host omits `sampleRate` on `speechService.init`.
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
        }
    }
}

// ---------------------------------------------------------------------------
// ModelConfig
// ---------------------------------------------------------------------------

/// Settings for model resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model loaded at startup when the host does not issue `model.create`
    /// itself.  `None` means wait for a command.
    pub preload_path: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { preload_path: None }
    }
}

// ---------------------------------------------------------------------------
// TransportConfig
// ---------------------------------------------------------------------------

/// Settings for the command transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Buffer depth of the command channel between transport and dispatcher.
    pub command_queue_depth: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            command_queue_depth: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// BridgeConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level bridge configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use speech_bridge::config::BridgeConfig;
///
/// // Load (returns Default when file is missing)
/// let config = BridgeConfig::load().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Audio capture settings.
    pub audio: AudioConfig,
    /// Model resolution settings.
    pub model: ModelConfig,
    /// Command transport settings.
    pub transport: TransportConfig,
}

impl BridgeConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(BridgeConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let mut original = BridgeConfig::default();
        original.audio.sample_rate = 8_000;
        original.model.preload_path = Some("/models/en-small".into());
        original.transport.command_queue_depth = 16;
        original.save_to(&path).expect("save");

        let loaded = BridgeConfig::load_from(&path).expect("load");
        assert_eq!(loaded.audio.sample_rate, 8_000);
        assert_eq!(loaded.model.preload_path.as_deref(), Some("/models/en-small"));
        assert_eq!(loaded.transport.command_queue_depth, 16);
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = BridgeConfig::load_from(&path).expect("should not error");
        assert_eq!(config.audio.sample_rate, 16_000);
        assert!(config.model.preload_path.is_none());
        assert_eq!(config.transport.command_queue_depth, 64);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "audio = \"not a table\"").unwrap();

        assert!(BridgeConfig::load_from(&path).is_err());
    }
}
