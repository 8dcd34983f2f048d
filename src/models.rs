use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Speaker arrangement of an interleaved stream
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChannelLayout {
    Mono,
    Stereo,
    Quadraphonic,
    Surround5_1,
    Surround7_1,
    Discrete(u16),
}

impl ChannelLayout {
    /// Pick the conventional layout for a channel count
    pub fn from_channel_count(channels: u16) -> Self {
        match channels {
            1 => ChannelLayout::Mono,
            2 => ChannelLayout::Stereo,
            4 => ChannelLayout::Quadraphonic,
            6 => ChannelLayout::Surround5_1,
            8 => ChannelLayout::Surround7_1,
            n => ChannelLayout::Discrete(n),
        }
    }

    pub fn channel_count(&self) -> u16 {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
            ChannelLayout::Quadraphonic => 4,
            ChannelLayout::Surround5_1 => 6,
            ChannelLayout::Surround7_1 => 8,
            ChannelLayout::Discrete(n) => *n,
        }
    }

    pub fn name(&self) -> String {
        match self {
            ChannelLayout::Mono => "mono".to_string(),
            ChannelLayout::Stereo => "stereo".to_string(),
            ChannelLayout::Quadraphonic => "quad".to_string(),
            ChannelLayout::Surround5_1 => "5.1".to_string(),
            ChannelLayout::Surround7_1 => "7.1".to_string(),
            ChannelLayout::Discrete(n) => format!("{} discrete", n),
        }
    }
}

/// Processing format of decoded audio: interleaved 32-bit float frames
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub layout: ChannelLayout,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            layout: ChannelLayout::from_channel_count(channels),
        }
    }

    pub fn with_layout(sample_rate: u32, layout: ChannelLayout) -> Self {
        Self {
            sample_rate,
            channels: layout.channel_count(),
            layout,
        }
    }

    /// Size of one interleaved frame in bytes
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * std::mem::size_of::<f32>()
    }

    /// Two formats can share a ring buffer when rate and channel count agree
    pub fn is_compatible(&self, other: &AudioFormat) -> bool {
        self.sample_rate == other.sample_rate && self.channels == other.channels
    }

    pub fn frames_to_duration(&self, frames: u64) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }

    pub fn duration_to_frames(&self, duration: Duration) -> u64 {
        (duration.as_secs_f64() * self.sample_rate as f64).round() as u64
    }

    /// Get a human-readable format description
    pub fn format_description(&self) -> String {
        format!("{} Hz, {} ch ({})", self.sample_rate, self.channels, self.layout.name())
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_description())
    }
}

/// Identifier handed out when a decoder is queued
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecoderId(pub u64);

impl fmt::Display for DecoderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Decoder lifecycle notifications delivered by the decode thread
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    DecodingStarted { id: DecoderId },
    DecodingFinished { id: DecoderId, frames: u64 },
    RenderingStarted { id: DecoderId },
    RenderingFinished { id: DecoderId },
    DecodeError { id: DecoderId, message: String },
    PlaylistFinished,
}

impl PlayerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerEvent::DecodingStarted { .. } => "DECODING_STARTED",
            PlayerEvent::DecodingFinished { .. } => "DECODING_FINISHED",
            PlayerEvent::RenderingStarted { .. } => "RENDERING_STARTED",
            PlayerEvent::RenderingFinished { .. } => "RENDERING_FINISHED",
            PlayerEvent::DecodeError { .. } => "DECODE_ERROR",
            PlayerEvent::PlaylistFinished => "PLAYLIST_FINISHED",
        }
    }

    pub fn decoder_id(&self) -> Option<DecoderId> {
        match self {
            PlayerEvent::DecodingStarted { id }
            | PlayerEvent::DecodingFinished { id, .. }
            | PlayerEvent::RenderingStarted { id }
            | PlayerEvent::RenderingFinished { id }
            | PlayerEvent::DecodeError { id, .. } => Some(*id),
            PlayerEvent::PlaylistFinished => None,
        }
    }
}

/// Playback state enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    /// Get a human-readable string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Stopped => "Stopped",
            PlaybackState::Playing => "Playing",
            PlaybackState::Paused => "Paused",
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            PlaybackState::Stopped => 0,
            PlaybackState::Playing => 1,
            PlaybackState::Paused => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => PlaybackState::Playing,
            2 => PlaybackState::Paused,
            _ => PlaybackState::Stopped,
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of the player, assembled from atomics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStatus {
    pub state: PlaybackState,
    pub current_frame: i64,
    pub total_frames: Option<i64>,
    pub position: Duration,
    pub duration: Option<Duration>,
    pub volume: f32,
    pub pre_gain_db: f32,
    pub pre_gain_enabled: bool,
    /// Decoder being rendered and its label
    pub playing: Option<DecoderId>,
    pub playing_description: Option<String>,
    pub output_format: Option<AudioFormat>,
    pub output_device: Option<String>,
    pub underruns: u64,
}

impl PlayerStatus {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Stopped,
            current_frame: 0,
            total_frames: None,
            position: Duration::ZERO,
            duration: None,
            volume: 1.0,
            pre_gain_db: 0.0,
            pre_gain_enabled: true,
            playing: None,
            playing_description: None,
            output_format: None,
            output_device: None,
            underruns: 0,
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, PlaybackState::Playing)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.state, PlaybackState::Paused)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.state, PlaybackState::Stopped)
    }

    /// Get progress as a fraction (0.0 to 1.0)
    pub fn progress(&self) -> f32 {
        match self.duration {
            Some(duration) if !duration.is_zero() => {
                (self.position.as_secs_f32() / duration.as_secs_f32()).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }

    /// Format position as MM:SS
    pub fn position_formatted(&self) -> String {
        format_clock(self.position)
    }

    /// Format duration as MM:SS, or --:-- when unknown
    pub fn duration_formatted(&self) -> String {
        match self.duration {
            Some(duration) => format_clock(duration),
            None => "--:--".to_string(),
        }
    }
}

impl Default for PlayerStatus {
    fn default() -> Self {
        Self::new()
    }
}

fn format_clock(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_layout_from_count() {
        assert_eq!(ChannelLayout::from_channel_count(1), ChannelLayout::Mono);
        assert_eq!(ChannelLayout::from_channel_count(2), ChannelLayout::Stereo);
        assert_eq!(ChannelLayout::from_channel_count(6), ChannelLayout::Surround5_1);
        assert_eq!(ChannelLayout::from_channel_count(3), ChannelLayout::Discrete(3));
        assert_eq!(ChannelLayout::Discrete(3).channel_count(), 3);
        assert_eq!(ChannelLayout::Surround7_1.channel_count(), 8);
    }

    #[test]
    fn test_audio_format_creation() {
        let format = AudioFormat::new(44100, 2);

        assert_eq!(format.sample_rate, 44100);
        assert_eq!(format.channels, 2);
        assert_eq!(format.layout, ChannelLayout::Stereo);
        assert_eq!(format.bytes_per_frame(), 8);
    }

    #[test]
    fn test_audio_format_description() {
        assert_eq!(AudioFormat::new(44100, 2).format_description(), "44100 Hz, 2 ch (stereo)");
        assert_eq!(AudioFormat::new(48000, 1).to_string(), "48000 Hz, 1 ch (mono)");
    }

    #[test]
    fn test_audio_format_compatibility() {
        let a = AudioFormat::new(44100, 2);
        let b = AudioFormat::with_layout(44100, ChannelLayout::Discrete(2));
        let c = AudioFormat::new(48000, 2);

        assert!(a.is_compatible(&b));
        assert!(!a.is_compatible(&c));
    }

    #[test]
    fn test_frame_duration_conversion() {
        let format = AudioFormat::new(48000, 2);
        assert_eq!(format.frames_to_duration(48000), Duration::from_secs(1));
        assert_eq!(format.duration_to_frames(Duration::from_millis(500)), 24000);
        assert_eq!(AudioFormat::new(0, 2).frames_to_duration(100), Duration::ZERO);
    }

    #[test]
    fn test_player_event_decoder_id() {
        let event = PlayerEvent::RenderingStarted { id: DecoderId(4) };
        assert_eq!(event.decoder_id(), Some(DecoderId(4)));
        assert_eq!(event.as_str(), "RENDERING_STARTED");
        assert_eq!(PlayerEvent::PlaylistFinished.decoder_id(), None);
    }

    #[test]
    fn test_playback_state_round_trip_through_u8() {
        for state in [PlaybackState::Stopped, PlaybackState::Playing, PlaybackState::Paused] {
            assert_eq!(PlaybackState::from_u8(state.to_u8()), state);
        }
        assert_eq!(PlaybackState::Paused.to_string(), "Paused");
    }

    #[test]
    fn test_player_status_progress() {
        let mut status = PlayerStatus::new();
        assert_eq!(status.progress(), 0.0);
        assert_eq!(status.duration_formatted(), "--:--");

        status.position = Duration::from_secs(30);
        status.duration = Some(Duration::from_secs(120));
        assert!((status.progress() - 0.25).abs() < 1e-6);
        assert_eq!(status.position_formatted(), "00:30");
        assert_eq!(status.duration_formatted(), "02:00");
    }

    #[test]
    fn test_player_status_serialization() {
        let mut status = PlayerStatus::new();
        status.state = PlaybackState::Paused;
        status.output_format = Some(AudioFormat::new(96000, 2));
        status.playing = Some(DecoderId(4));
        status.playing_description = Some("track.flac".to_string());

        let json = serde_json::to_string(&status).unwrap();
        let restored: PlayerStatus = serde_json::from_str(&json).unwrap();

        assert!(restored.is_paused());
        assert_eq!(restored.output_format, status.output_format);
        assert_eq!(restored.playing, Some(DecoderId(4)));
        assert_eq!(restored.playing_description.as_deref(), Some("track.flac"));
    }
}
