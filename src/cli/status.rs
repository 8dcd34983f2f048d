use std::io::{self, Write};

use crate::audio::DeviceCapabilities;
use crate::error::{AudioError, DecodeError, ErrorSeverity, PlayerError};
use crate::models::PlayerStatus;

/// Status display formatter for the CLI
pub struct StatusDisplay;

impl StatusDisplay {
    /// Full player status as a boxed report
    pub fn display_full_status(status: &PlayerStatus) {
        println!("┌─ Player Status ─────────────────────────────────────────┐");
        println!("│ Status: {}", status.state.as_str());
        if let Some(description) = &status.playing_description {
            println!("│ Source: {}", Self::truncate(description, 49));
        }
        println!(
            "│ Position: {} / {}",
            status.position_formatted(),
            status.duration_formatted()
        );
        if status.duration.is_some() {
            println!("│ Progress: [{}] {:.1}%", Self::progress_bar(status.progress(), 40), status.progress() * 100.0);
        }
        match status.total_frames {
            Some(total) => println!("│ Frame: {} of {}", status.current_frame, total),
            None => println!("│ Frame: {}", status.current_frame),
        }

        println!("│");
        match &status.output_format {
            Some(format) => println!("│ Format: {}", format.format_description()),
            None => println!("│ Format: -"),
        }
        println!(
            "│ Device: {}",
            Self::truncate(status.output_device.as_deref().unwrap_or("Default"), 49)
        );
        println!(
            "│ Volume: {}%  Pre-gain: {:+.1} dB{}",
            (status.volume * 100.0).round() as u8,
            status.pre_gain_db,
            if status.pre_gain_enabled { "" } else { " (bypassed)" }
        );
        if status.underruns > 0 {
            println!("│ Underruns: {}", status.underruns);
        }
        println!("└─────────────────────────────────────────────────────────┘");
    }

    /// Single status line, rewritten in place
    pub fn display_position_update(status: &PlayerStatus) {
        print!("\r{}", Self::status_line(status));
        let _ = io::stdout().flush();
    }

    pub fn status_line(status: &PlayerStatus) -> String {
        let mut line = format!(
            "{:<7} [{}] {}/{}",
            status.state.as_str(),
            Self::progress_bar(status.progress(), 30),
            status.position_formatted(),
            status.duration_formatted()
        );
        if let Some(description) = &status.playing_description {
            line.push_str(&format!(" | {}", Self::truncate(description, 30)));
        }
        if let Some(format) = &status.output_format {
            line.push_str(&format!(" | {}", format));
        }
        if status.underruns > 0 {
            line.push_str(&format!(" | {} underruns", status.underruns));
        }
        line
    }

    pub fn display_devices(devices: &[DeviceCapabilities], default_device: Option<&str>) {
        if devices.is_empty() {
            println!("No output devices found");
            return;
        }

        println!("Output devices:");
        for device in devices {
            let marker = if default_device == Some(device.name.as_str()) { "*" } else { " " };
            let rates: Vec<String> = device
                .supported_sample_rates
                .iter()
                .map(|rate| format!("{:.1}k", *rate as f64 / 1000.0))
                .collect();
            println!(
                " {} {} ({} ch max; {})",
                marker,
                device.name,
                device.max_channels,
                rates.join(", ")
            );
        }
    }

    /// Error message with a short hint where one applies
    pub fn display_error(error: &PlayerError) {
        let severity = error.severity();
        let severity_icon = match severity {
            ErrorSeverity::Info => "ℹ",
            ErrorSeverity::Warning => "⚠",
            ErrorSeverity::Error | ErrorSeverity::Critical => "✗",
        };

        eprintln!("{} {}: {}", severity_icon, severity.as_str(), error.user_message());
        if let Some(hint) = Self::error_hint(error) {
            eprintln!("  {}", hint);
        }
    }

    fn error_hint(error: &PlayerError) -> Option<&'static str> {
        match error {
            PlayerError::Audio(AudioError::DeviceNotFound { .. }) => Some("Use 'hpe devices' to see available devices"),
            PlayerError::Audio(AudioError::UnsupportedSampleRate { .. }) => {
                Some("Common rates: 44.1kHz, 48kHz, 96kHz, 192kHz")
            }
            PlayerError::Audio(AudioError::FormatMismatch { .. }) => {
                Some("Files played back to back must share sample rate and channel count")
            }
            PlayerError::Decode(DecodeError::UnsupportedFormat { .. })
            | PlayerError::Audio(AudioError::Decoder(DecodeError::UnsupportedFormat { .. })) => {
                Some("Supported: FLAC, WAV, ALAC, AAC, MP3, OGG/Vorbis")
            }
            PlayerError::Config(_) => Some("Run 'hpe config reset' to restore defaults"),
            _ => None,
        }
    }

    fn progress_bar(progress: f32, width: usize) -> String {
        let filled = ((progress.clamp(0.0, 1.0) * width as f32) as usize).min(width);
        format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
    }

    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{}...", kept)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AudioFormat, PlaybackState};
    use std::time::Duration;

    fn playing_status() -> PlayerStatus {
        PlayerStatus {
            state: PlaybackState::Playing,
            current_frame: 44100 * 90,
            total_frames: Some(44100 * 180),
            position: Duration::from_secs(90),
            duration: Some(Duration::from_secs(180)),
            output_format: Some(AudioFormat::new(44100, 2)),
            ..PlayerStatus::new()
        }
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(StatusDisplay::progress_bar(0.0, 4), "░░░░");
        assert_eq!(StatusDisplay::progress_bar(0.5, 4), "██░░");
        assert_eq!(StatusDisplay::progress_bar(2.0, 4), "████");
    }

    #[test]
    fn test_status_line() {
        let line = StatusDisplay::status_line(&playing_status());
        assert!(line.starts_with("Playing"));
        assert!(line.contains("01:30/03:00"));
        assert!(line.contains("44100 Hz"));
        assert!(!line.contains("underruns"));
        assert!(!line.contains("track.flac"));

        let mut status = playing_status();
        status.underruns = 3;
        status.duration = None;
        status.playing_description = Some("track.flac".to_string());
        let line = StatusDisplay::status_line(&status);
        assert!(line.contains("| track.flac |"));
        assert!(line.contains("--:--"));
        assert!(line.contains("3 underruns"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(StatusDisplay::truncate("short", 10), "short");
        assert_eq!(StatusDisplay::truncate("a much longer device name", 10), "a much ...");
        assert_eq!(StatusDisplay::truncate("äöüäöüäöüäöü", 6), "äöü...");
    }

    #[test]
    fn test_error_hints() {
        let error = PlayerError::Audio(AudioError::DeviceNotFound {
            device: "DAC".to_string(),
        });
        assert!(StatusDisplay::error_hint(&error).unwrap().contains("hpe devices"));

        let error = PlayerError::Audio(AudioError::EmptyQueue);
        assert!(StatusDisplay::error_hint(&error).is_none());
    }
}
