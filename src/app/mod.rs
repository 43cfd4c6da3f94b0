use crate::{
    cli::{OutputFormat, RunOptions},
    config::{self, Config},
    polling::start_polling,
    serial::{classify_error, SerialOptions},
    session::{Session, SessionOptions},
    Error, Result,
};
use log::{error, info, LevelFilter};
use std::sync::Arc;
use std::time::Duration;

mod console;
mod lifecycle;
mod logger;

use console::Console;
use lifecycle::create_shutdown_flag;
pub use logger::{parse_level, Logger};

/// Config for the daemon: file settings with CLI overrides applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub link: Config,
    pub log_level: LevelFilter,
    pub log_file: Option<String>,
    pub format: OutputFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            link: Config::default(),
            log_level: LevelFilter::Info,
            log_file: None,
            format: OutputFormat::default(),
        }
    }
}

impl AppConfig {
    pub fn from_sources(config: Config, opts: RunOptions) -> Result<Self> {
        let log_level = match opts.log_level.as_deref() {
            Some(raw) => parse_level(raw)
                .ok_or_else(|| Error::InvalidArgs(format!("unknown log level '{raw}'")))?,
            None => LevelFilter::Info,
        };
        let link = Config {
            device: opts.device.unwrap_or(config.device),
            baud: opts.baud.unwrap_or(config.baud),
            serial_timeout_ms: opts.serial_timeout_ms.unwrap_or(config.serial_timeout_ms),
            poll_interval_ms: opts.poll_interval_ms.unwrap_or(config.poll_interval_ms),
            key_press_duration_ms: opts
                .key_press_duration_ms
                .unwrap_or(config.key_press_duration_ms),
            ..config
        };
        config::validate(&link)?;
        Ok(Self {
            link,
            log_level,
            log_file: opts.log_file,
            format: opts.format,
        })
    }

    pub fn serial_options(&self) -> SerialOptions {
        SerialOptions {
            baud: self.link.baud,
            timeout_ms: self.link.serial_timeout_ms,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            display_page: self.link.display_page,
            failure_threshold: self.link.failure_threshold,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.link.poll_interval_ms)
    }
}

pub struct App {
    config: AppConfig,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn from_options(opts: RunOptions) -> Result<Self> {
        let cfg_file = match opts.config.as_deref() {
            Some(path) => Config::load_from_path(path)?,
            None => Config::load_or_default()?,
        };
        Ok(Self::new(AppConfig::from_sources(cfg_file, opts)?))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Entry point for the daemon. Opening the port is the only fatal step.
    pub fn run(&self) -> Result<()> {
        let config = &self.config;
        Logger::new(config.log_level, config.log_file.clone())?.install()?;
        info!(
            "daemon start (device={}, baud={}, poll={}ms, key_duration={}ms)",
            config.link.device,
            config.link.baud,
            config.link.poll_interval_ms,
            config.link.key_press_duration_ms
        );

        let session = match Session::open(
            &config.link.device,
            config.serial_options(),
            config.session_options(),
        ) {
            Ok(session) => Arc::new(session),
            Err(err) => {
                error!(
                    "failed to initialize UART {}: {err} ({})",
                    config.link.device,
                    classify_error(&err).hint()
                );
                return Err(err);
            }
        };

        let events = session.subscribe();
        let running = create_shutdown_flag()?;
        let mut worker = start_polling(session, config.poll_interval(), running.clone())?;

        let result = Console::new(&config.link, config.format).run(&worker, events, running);
        worker.stop();
        info!("daemon stopped ({} tick(s) coalesced)", worker.ticks_skipped());
        result
    }
}
