use crate::{Error, Result};
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::File;
use std::io::Write;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::SystemTime;

const LEVEL_ENV: &str = "VMCLINK_LOG_LEVEL";
const PATH_ENV: &str = "VMCLINK_LOG_PATH";

/// Parse a level name; accepts the usual `log` names plus "warning".
pub fn parse_level(raw: &str) -> Option<LevelFilter> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "warning" => Some(LevelFilter::Warn),
        other => LevelFilter::from_str(other).ok(),
    }
}

/// stderr logger with an optional append-only file sink, installed behind the `log` facade.
pub struct Logger {
    level: LevelFilter,
    file: Option<Mutex<File>>,
}

impl Logger {
    /// Environment variables win over the configured level and path.
    pub fn new(level: LevelFilter, file_path: Option<String>) -> Result<Self> {
        let effective_level = std::env::var(LEVEL_ENV)
            .ok()
            .and_then(|s| parse_level(&s))
            .unwrap_or(level);

        let path = std::env::var(PATH_ENV).ok().or(file_path);
        let file = match path {
            Some(p) => Some(Mutex::new(
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&p)
                    .map_err(|e| {
                        Error::Io(std::io::Error::new(
                            e.kind(),
                            format!("cannot open log file {p}: {e}"),
                        ))
                    })?,
            )),
            None => None,
        };
        Ok(Self {
            level: effective_level,
            file,
        })
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Make this the process-wide logger. Fails if one is already installed.
    pub fn install(self) -> Result<()> {
        let level = self.level;
        log::set_boxed_logger(Box::new(self))
            .map_err(|e| Error::Config(format!("logger: {e}")))?;
        log::set_max_level(level);
        Ok(())
    }

    fn format_line(record: &Record<'_>) -> String {
        let ts = humantime::format_rfc3339_millis(SystemTime::now());
        format!("[{ts}] [{}] {}", record.level(), record.args())
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = Self::format_line(record);
        eprintln!("{line}");
        if let Some(file) = self.file.as_ref() {
            if let Ok(mut file) = file.lock() {
                let _ = writeln!(file, "{line}");
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = self.file.as_ref() {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;
    use tempfile::tempdir;

    #[test]
    fn parses_level_names() {
        assert_eq!(parse_level("WARNING"), Some(LevelFilter::Warn));
        assert_eq!(parse_level("debug"), Some(LevelFilter::Debug));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn writes_enabled_records_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vmclink.log");
        let logger = Logger {
            level: LevelFilter::Info,
            file: Some(Mutex::new(
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .unwrap(),
            )),
        };
        logger.log(
            &Record::builder()
                .level(Level::Warn)
                .args(format_args!("no response from VMC"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(Level::Debug)
                .args(format_args!("hidden"))
                .build(),
        );
        logger.flush();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[WARN] no response from VMC"));
        assert!(!contents.contains("hidden"));
    }

    #[test]
    fn unwritable_log_path_is_an_error() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("missing-dir").join("x.log");
        if std::env::var(PATH_ENV).is_ok() {
            return;
        }
        let err = Logger::new(LevelFilter::Info, Some(bad.display().to_string()))
            .err()
            .expect("expected open failure");
        assert!(format!("{err}").contains("cannot open log file"));
    }
}
