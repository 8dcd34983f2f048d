use thiserror::Error;

/// Top-level error type used by the command line front end
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl PlayerError {
    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            PlayerError::Audio(err) => err.user_message(),
            PlayerError::File(err) => Self::format_file_error(err),
            PlayerError::Decode(err) => err.user_message(),
            PlayerError::Config(err) => err.user_message(),
        }
    }

    /// Check if this error allows for automatic recovery
    pub fn is_recoverable(&self) -> bool {
        match self {
            PlayerError::Audio(err) => err.is_recoverable(),
            PlayerError::File(_) => false,
            PlayerError::Decode(err) => err.is_recoverable(),
            PlayerError::Config(err) => err.is_recoverable(),
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PlayerError::Audio(AudioError::DeviceNotFound { .. }) => ErrorSeverity::Error,
            PlayerError::Audio(AudioError::EmptyQueue) => ErrorSeverity::Info,
            PlayerError::Audio(AudioError::InvalidSeekFrame { .. })
            | PlayerError::Audio(AudioError::InvalidParameter(_)) => ErrorSeverity::Warning,
            PlayerError::Audio(_) => ErrorSeverity::Critical,
            PlayerError::File(_) => ErrorSeverity::Error,
            PlayerError::Decode(DecodeError::UnsupportedFormat { .. }) => ErrorSeverity::Warning,
            PlayerError::Decode(_) => ErrorSeverity::Error,
            PlayerError::Config(_) => ErrorSeverity::Warning,
        }
    }

    fn format_file_error(err: &std::io::Error) -> String {
        match err.kind() {
            std::io::ErrorKind::NotFound => "File or directory not found".to_string(),
            std::io::ErrorKind::PermissionDenied => "Permission denied - cannot access file".to_string(),
            std::io::ErrorKind::InvalidData => "File contains invalid or corrupted data".to_string(),
            _ => format!("File system error: {}", err),
        }
    }
}

/// Error severity levels for logging and user feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error | ErrorSeverity::Critical => log::Level::Error,
        }
    }
}

/// Errors raised by the playback engine and its output graph
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("Unsupported sample rate: {rate}")]
    UnsupportedSampleRate { rate: u32 },

    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Format mismatch: expected {expected}, found {found}")]
    FormatMismatch { expected: String, found: String },

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Audio initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Invalid seek frame {frame} (total frames: {})", .total.map_or_else(|| "unknown".to_string(), |t| t.to_string()))]
    InvalidSeekFrame { frame: i64, total: Option<i64> },

    #[error("No decoder is currently rendering")]
    NoActiveDecoder,

    #[error("Current decoder does not support seeking")]
    SeekNotSupported,

    #[error("Nothing is queued for playback")]
    EmptyQueue,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Decoder error: {0}")]
    Decoder(#[from] DecodeError),

    #[error("Ring buffer error: {0}")]
    RingBuffer(#[from] RingBufferError),
}

impl AudioError {
    pub fn user_message(&self) -> String {
        match self {
            AudioError::DeviceNotFound { device } => {
                format!("Audio device '{}' is not available or has been disconnected", device)
            }
            AudioError::UnsupportedSampleRate { rate } => {
                format!("Sample rate {} Hz is not supported by the current audio device", rate)
            }
            AudioError::UnsupportedFormat { format } => {
                format!("Audio format '{}' is not supported", format)
            }
            AudioError::FormatMismatch { expected, found } => {
                format!("Track format {} does not match the playing format {}", found, expected)
            }
            AudioError::StreamError(msg) => format!("Audio playback interrupted: {}", msg),
            AudioError::InitializationFailed(msg) => {
                format!("Failed to initialize audio system: {}", msg)
            }
            AudioError::InvalidSeekFrame { frame, total } => match total {
                Some(total) => format!("Cannot seek to frame {} - track has {} frames", frame, total),
                None => format!("Cannot seek to frame {}", frame),
            },
            AudioError::NoActiveDecoder => "Nothing is playing".to_string(),
            AudioError::SeekNotSupported => "This track cannot be seeked".to_string(),
            AudioError::EmptyQueue => "No tracks in queue - add some files first".to_string(),
            AudioError::InvalidParameter(msg) => format!("Invalid value: {}", msg),
            AudioError::Decoder(err) => err.user_message(),
            AudioError::RingBuffer(err) => format!("Audio buffer could not be prepared: {}", err),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            AudioError::DeviceNotFound { .. } => true, // Can fall back to the default device
            AudioError::UnsupportedSampleRate { .. } => false,
            AudioError::UnsupportedFormat { .. } => false,
            AudioError::FormatMismatch { .. } => true, // Can be queued after a stop
            AudioError::StreamError(_) => true,
            AudioError::InitializationFailed(_) => true,
            AudioError::InvalidSeekFrame { .. } => true,
            AudioError::NoActiveDecoder => true,
            AudioError::SeekNotSupported => true,
            AudioError::EmptyQueue => true,
            AudioError::InvalidParameter(_) => true,
            AudioError::Decoder(err) => err.is_recoverable(),
            AudioError::RingBuffer(_) => false,
        }
    }
}

/// Audio decoding errors
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Corrupted file: {0}")]
    CorruptedFile(String),

    #[error("Seek error: {0}")]
    SeekError(String),

    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    #[error("Decoder is not open")]
    NotOpen,
}

impl DecodeError {
    pub fn user_message(&self) -> String {
        match self {
            DecodeError::UnsupportedFormat { format } => {
                format!("Audio format '{}' is not supported by this player", format)
            }
            DecodeError::CorruptedFile(msg) => {
                format!("Audio file appears to be corrupted or damaged: {}", msg)
            }
            DecodeError::SeekError(msg) => format!("Cannot seek in this audio file: {}", msg),
            DecodeError::DecodeFailed(msg) => format!("Failed to decode audio data: {}", msg),
            DecodeError::NotOpen => "The audio file has not been opened".to_string(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            DecodeError::UnsupportedFormat { .. } => false,
            DecodeError::CorruptedFile(_) => false,
            DecodeError::SeekError(_) => true, // Can continue without seeking
            DecodeError::DecodeFailed(_) => false,
            DecodeError::NotOpen => true,
        }
    }
}

/// Ring buffer allocation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingBufferError {
    #[error("Invalid ring buffer capacity: {requested} bytes (must be between 2 and 2^31)")]
    InvalidCapacity { requested: usize },

    #[error("Unable to allocate {bytes} bytes for the ring buffer")]
    AllocationFailed { bytes: usize },
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::ConfigDirNotFound => {
                "Cannot find or create configuration directory".to_string()
            }
            ConfigError::IoError(err) => format!("Cannot access configuration file: {}", err),
            ConfigError::SerializationError(_) => "Failed to save configuration settings".to_string(),
            ConfigError::DeserializationError(_) => {
                "Configuration file is corrupted or has invalid format".to_string()
            }
            ConfigError::InvalidValue { field, reason } => {
                format!("Configuration setting '{}' is invalid: {}", field, reason)
            }
        }
    }

    pub fn is_recoverable(&self) -> bool {
        true // Defaults are always available
    }
}
