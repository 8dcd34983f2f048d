use chrono::{DateTime, Local};
use log::{debug, info, warn, LevelFilter};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::models::PlayerEvent;

/// Environment variable holding the log level
pub const LOG_LEVEL_VAR: &str = "PLAYBACK_ENGINE_LOG";

/// Initialize `env_logger` with the engine's format.
///
/// The level comes from `PLAYBACK_ENGINE_LOG` and defaults to `info`.
pub fn init() -> Result<(), log::SetLoggerError> {
    let log_level = std::env::var(LOG_LEVEL_VAR).unwrap_or_else(|_| "info".to_string());
    init_with_level(parse_level(&log_level))
}

pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    let mut builder = env_logger::Builder::new();

    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(
            buf,
            "{} [{}] [{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });
    builder.filter_level(level);
    builder.try_init()?;

    debug!("Logging initialized at level {}", level);
    Ok(())
}

/// Unknown names fall back to `info`
pub fn parse_level(name: &str) -> LevelFilter {
    match name.trim().to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" | "warning" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

/// Log a player lifecycle event at a level matching its importance
pub fn log_event(event: &PlayerEvent) {
    match event {
        PlayerEvent::DecodingStarted { id } => debug!("[{}] {}", event.as_str(), id),
        PlayerEvent::DecodingFinished { id, frames } => {
            debug!("[{}] {} ({} frames)", event.as_str(), id, frames)
        }
        PlayerEvent::RenderingStarted { id } | PlayerEvent::RenderingFinished { id } => {
            info!("[{}] {}", event.as_str(), id)
        }
        PlayerEvent::DecodeError { id, message } => warn!("[{}] {}: {}", event.as_str(), id, message),
        PlayerEvent::PlaylistFinished => info!("[{}]", event.as_str()),
    }
}

#[derive(Debug, Clone)]
pub struct LoggedEvent {
    pub timestamp: DateTime<Local>,
    pub event: PlayerEvent,
}

/// Logs events and keeps a bounded history of the most recent ones
#[derive(Clone)]
pub struct EventLogger {
    events: Arc<Mutex<VecDeque<LoggedEvent>>>,
    max_events: usize,
}

impl EventLogger {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events))),
            max_events,
        }
    }

    pub fn record(&self, event: PlayerEvent) {
        log_event(&event);

        let mut events = self.events.lock();
        events.push_back(LoggedEvent {
            timestamp: Local::now(),
            event,
        });
        while events.len() > self.max_events {
            events.pop_front();
        }
    }

    /// The last `count` events, oldest first
    pub fn recent(&self, count: usize) -> Vec<LoggedEvent> {
        let events = self.events.lock();
        let skip = events.len().saturating_sub(count);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn error_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|logged| matches!(logged.event, PlayerEvent::DecodeError { .. }))
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for EventLogger {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DecoderId;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level(" WARN "), LevelFilter::Warn);
        assert_eq!(parse_level("off"), LevelFilter::Off);
        assert_eq!(parse_level("nonsense"), LevelFilter::Info);
    }

    #[test]
    fn test_history_is_bounded() {
        let logger = EventLogger::new(3);
        for n in 0..5 {
            logger.record(PlayerEvent::DecodingStarted { id: DecoderId(n) });
        }

        let recent = logger.recent(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].event, PlayerEvent::DecodingStarted { id: DecoderId(2) });
        assert_eq!(recent[2].event, PlayerEvent::DecodingStarted { id: DecoderId(4) });

        let last = logger.recent(1);
        assert_eq!(last[0].event, PlayerEvent::DecodingStarted { id: DecoderId(4) });
    }

    #[test]
    fn test_error_count_and_clear() {
        let logger = EventLogger::default();
        logger.record(PlayerEvent::RenderingStarted { id: DecoderId(1) });
        logger.record(PlayerEvent::DecodeError {
            id: DecoderId(1),
            message: "bad packet".to_string(),
        });
        logger.record(PlayerEvent::PlaylistFinished);

        assert_eq!(logger.error_count(), 1);
        logger.clear();
        assert!(logger.recent(5).is_empty());
    }

    #[test]
    fn test_init_twice_fails_gracefully() {
        let _ = init_with_level(LevelFilter::Off);
        assert!(init_with_level(LevelFilter::Off).is_err());
    }
}
