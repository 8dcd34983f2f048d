use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hires_playback_engine::audio::{AudioPlayer, DeviceManager};
use hires_playback_engine::cli::{CliApp, Commands, ConfigAction, PlayArgs, StatusDisplay};
use hires_playback_engine::config::ConfigManager;
use hires_playback_engine::error::{AudioError, PlayerError};
use hires_playback_engine::logging::{self, EventLogger};
use hires_playback_engine::models::PlayerEvent;

const STATUS_INTERVAL: Duration = Duration::from_millis(100);
const START_SEEK_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs one CLI command against the engine
struct AppController {
    config_manager: ConfigManager,
    logger: EventLogger,
}

impl AppController {
    fn new() -> Result<Self, PlayerError> {
        Ok(Self {
            config_manager: ConfigManager::new()?,
            logger: EventLogger::default(),
        })
    }

    fn run(&mut self, command: Commands) -> Result<(), PlayerError> {
        match command {
            Commands::Play(args) => self.play(args),
            Commands::Devices => Self::list_devices(),
            Commands::Config { action } => self.config(action),
        }
    }

    fn play(&mut self, args: PlayArgs) -> Result<(), PlayerError> {
        let config = args.apply_to(self.config_manager.get_config())?;
        let mut player = AudioPlayer::with_default_output(&config)?;
        let events = player.subscribe();

        let mut queued = 0;
        for path in &args.files {
            match player.enqueue_path(path) {
                Ok(id) => {
                    info!("Queued {} as {}", path.display(), id);
                    queued += 1;
                }
                Err(e) => {
                    eprintln!("Skipping {}", path.display());
                    StatusDisplay::display_error(&e.into());
                }
            }
        }
        if queued == 0 {
            return Err(AudioError::EmptyQueue.into());
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || shutdown_flag.store(true, Ordering::Relaxed)) {
            warn!("Could not install Ctrl-C handler: {}", e);
        }

        player.play()?;
        if let Some(start) = args.start {
            Self::seek_when_ready(&mut player, start)?;
        }

        self.watch(&player, &events, &shutdown);
        println!();

        let status = player.status();
        player.stop()?;
        if status.underruns > 0 {
            println!("{} buffer underrun(s) during playback", status.underruns);
        }
        if self.logger.error_count() > 0 {
            println!("{} file(s) ended early because of decode errors", self.logger.error_count());
        }
        Ok(())
    }

    /// The first decoder becomes seekable once the decode thread activates it
    fn seek_when_ready(player: &mut AudioPlayer, start: Duration) -> Result<(), PlayerError> {
        let deadline = Instant::now() + START_SEEK_TIMEOUT;
        loop {
            match player.seek_to_time(start) {
                Err(AudioError::NoActiveDecoder) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(10));
                }
                result => return result.map_err(PlayerError::from),
            }
        }
    }

    fn watch(&self, player: &AudioPlayer, events: &Receiver<PlayerEvent>, shutdown: &AtomicBool) {
        loop {
            let mut finished = false;
            for event in events.try_iter() {
                finished |= event == PlayerEvent::PlaylistFinished;
                self.logger.record(event);
            }

            StatusDisplay::display_position_update(&player.status());

            if finished || shutdown.load(Ordering::Relaxed) {
                break;
            }
            std::thread::sleep(STATUS_INTERVAL);
        }
    }

    fn list_devices() -> Result<(), PlayerError> {
        let manager = DeviceManager::new()?;
        let devices: Vec<_> = manager
            .list_devices()
            .iter()
            .filter_map(|name| manager.get_capabilities(name).cloned())
            .collect();
        StatusDisplay::display_devices(&devices, manager.default_device_name().as_deref());
        Ok(())
    }

    fn config(&mut self, action: ConfigAction) -> Result<(), PlayerError> {
        match action {
            ConfigAction::Show => {
                println!("# {}", self.config_manager.config_path().display());
                let rendered = toml::to_string_pretty(self.config_manager.get_config())
                    .map_err(hires_playback_engine::error::ConfigError::from)?;
                print!("{}", rendered);
            }
            ConfigAction::Reset => {
                self.config_manager.reset_to_defaults()?;
                println!("Configuration reset to defaults");
            }
        }
        Ok(())
    }
}

fn main() {
    let cli = CliApp::parse();

    let logging_result = match cli.log_level.as_deref() {
        Some(level) => logging::init_with_level(logging::parse_level(level)),
        None => logging::init(),
    };
    if let Err(e) = logging_result {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let result = AppController::new().and_then(|mut app| app.run(cli.command));
    if let Err(e) = result {
        StatusDisplay::display_error(&e);
        std::process::exit(1);
    }

    info!("Shutdown complete");
}
