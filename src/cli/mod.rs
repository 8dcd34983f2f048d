use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::PlayerConfig;
use crate::error::ConfigError;

pub mod status;
pub use status::StatusDisplay;

/// Gapless high-resolution playback engine
#[derive(Debug, Parser)]
#[command(name = "hpe")]
#[command(about = "Gapless, sample-accurate playback of high-resolution audio files")]
#[command(version)]
pub struct CliApp {
    /// Log level (trace, debug, info, warn, error); overrides PLAYBACK_ENGINE_LOG
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Play one or more files back to back without gaps
    Play(PlayArgs),
    /// List available audio output devices
    Devices,
    /// Show or reset the saved configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Args)]
pub struct PlayArgs {
    /// Files to play, in order
    #[arg(required = true, value_parser = parse_path)]
    pub files: Vec<PathBuf>,

    /// Output device name
    #[arg(short, long)]
    pub device: Option<String>,

    /// Volume between 0.0 and 1.0
    #[arg(short, long)]
    pub volume: Option<f32>,

    /// Pre-gain in dB (-40 to +40)
    #[arg(long, allow_hyphen_values = true)]
    pub pre_gain: Option<f32>,

    /// Device sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Start position in the first file (e.g. "90", "90s", "1:30")
    #[arg(long, value_parser = CliApp::parse_time)]
    pub start: Option<Duration>,
}

impl PlayArgs {
    /// Layer the command line overrides on top of the saved configuration
    pub fn apply_to(&self, config: &PlayerConfig) -> Result<PlayerConfig, ConfigError> {
        let mut merged = config.clone();
        if let Some(device) = &self.device {
            merged.preferred_device = Some(device.clone());
        }
        if let Some(volume) = self.volume {
            merged.default_volume = volume;
        }
        if let Some(pre_gain) = self.pre_gain {
            merged.pre_gain_db = pre_gain;
        }
        if let Some(rate) = self.sample_rate {
            merged.device_sample_rate = Some(rate);
        }
        merged.validate()?;
        Ok(merged)
    }
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the current configuration as TOML
    Show,
    /// Restore default settings
    Reset,
}

impl CliApp {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Expand tilde (~) in path to home directory
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            match dirs::home_dir() {
                Some(home_dir) => home_dir.join(rest),
                None => PathBuf::from(path),
            }
        } else if path == "~" {
            dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
        } else {
            PathBuf::from(path)
        }
    }

    /// Parse a time such as "90", "90s", "1:30" or "1:30.5"
    pub fn parse_time(time_str: &str) -> Result<Duration, ParseError> {
        let trimmed = time_str.trim();
        let invalid = || ParseError::InvalidTimeFormat {
            input: time_str.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid());
        }

        let seconds = if let Some((minutes, seconds)) = trimmed.split_once(':') {
            let minutes: u64 = minutes.parse().map_err(|_| invalid())?;
            let seconds: f64 = seconds.parse().map_err(|_| invalid())?;
            if !(0.0..60.0).contains(&seconds) {
                return Err(invalid());
            }
            minutes as f64 * 60.0 + seconds
        } else {
            let seconds: f64 = trimmed.trim_end_matches('s').parse().map_err(|_| invalid())?;
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(invalid());
            }
            seconds
        };

        Ok(Duration::from_secs_f64(seconds))
    }

    /// Format duration as MM:SS
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
    }
}

fn parse_path(path: &str) -> Result<PathBuf, ParseError> {
    if path.trim().is_empty() {
        return Err(ParseError::EmptyPath);
    }
    Ok(CliApp::expand_path(path))
}

/// Command parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Empty path")]
    EmptyPath,

    #[error("Invalid time format: {input}")]
    InvalidTimeFormat { input: String },
}
