use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::audio::MAX_CHANNELS;
use crate::error::ConfigError;

/// Largest ring buffer the engine will allocate, in bytes
const MAX_RING_BYTES: usize = 1 << 31;

/// Engine configuration, persisted as TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Ring buffer length in frames
    pub ring_buffer_frames: usize,
    /// Frames decoded per write into the ring buffer
    pub write_chunk_frames: usize,
    pub default_volume: f32,
    pub pre_gain_db: f32,
    pub preferred_device: Option<String>,
    pub device_sample_rate: Option<u32>,
    pub decoder_thread_name: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            ring_buffer_frames: 16384,
            write_chunk_frames: 2048,
            default_volume: 1.0,
            pre_gain_db: 0.0,
            preferred_device: None,
            device_sample_rate: None,
            decoder_thread_name: "decoder".to_string(),
        }
    }
}

impl PlayerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ring_buffer_frames == 0 {
            return Err(invalid("ring_buffer_frames", "must be greater than zero"));
        }
        if self.write_chunk_frames == 0 {
            return Err(invalid("write_chunk_frames", "must be greater than zero"));
        }
        if self.write_chunk_frames > self.ring_buffer_frames / 2 {
            return Err(invalid(
                "write_chunk_frames",
                format!("must be at most half of ring_buffer_frames ({})", self.ring_buffer_frames),
            ));
        }

        let too_large = self
            .ring_buffer_frames
            .checked_mul(MAX_CHANNELS as usize * std::mem::size_of::<f32>())
            .map_or(true, |bytes| bytes > MAX_RING_BYTES);
        if too_large {
            return Err(invalid("ring_buffer_frames", "ring buffer would exceed 2 GiB"));
        }

        if !(0.0..=1.0).contains(&self.default_volume) {
            return Err(invalid("default_volume", "must be between 0.0 and 1.0"));
        }
        if !(-40.0..=40.0).contains(&self.pre_gain_db) {
            return Err(invalid("pre_gain_db", "must be between -40 and +40 dB"));
        }
        if self.device_sample_rate == Some(0) {
            return Err(invalid("device_sample_rate", "must be greater than zero"));
        }
        if self.decoder_thread_name.is_empty() {
            return Err(invalid("decoder_thread_name", "must not be empty"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

/// Loads and saves the configuration file
pub struct ConfigManager {
    config: PlayerConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        Self::with_path(config_path)
    }

    /// Manager backed by an explicit file; a missing file yields defaults
    pub fn with_path(config_path: PathBuf) -> Result<Self, ConfigError> {
        let config = Self::load_config(&config_path)?;
        Ok(Self { config, config_path })
    }

    pub fn get_config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Apply `updater` and persist the result. Invalid changes are rolled back.
    pub fn update_config<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut PlayerConfig),
    {
        let mut updated = self.config.clone();
        updater(&mut updated);
        updated.validate()?;
        self.config = updated;
        self.save_config()
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<(), ConfigError> {
        self.update_config(|config| config.default_volume = volume.clamp(0.0, 1.0))
    }

    pub fn set_preferred_device(&mut self, device: Option<String>) -> Result<(), ConfigError> {
        self.update_config(|config| config.preferred_device = device)
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.config = PlayerConfig::default();
        self.save_config()
    }

    fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::home_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join(".config")
            .join("hires-playback-engine");

        Ok(config_dir.join("config.toml"))
    }

    fn load_config(path: &Path) -> Result<PlayerConfig, ConfigError> {
        if !path.exists() {
            return Ok(PlayerConfig::default());
        }

        let config_content = std::fs::read_to_string(path)?;
        let config: PlayerConfig = toml::from_str(&config_content)?;
        config.validate()?;

        Ok(config)
    }

    fn save_config(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let config_content = toml::to_string_pretty(&self.config)?;
        std::fs::write(&self.config_path, config_content)?;

        Ok(())
    }
}
