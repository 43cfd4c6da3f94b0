use crate::{
    health::DEFAULT_FAILURE_THRESHOLD,
    polling::DEFAULT_POLL_INTERVAL_MS,
    protocol::{DEFAULT_DISPLAY_PAGE, DEFAULT_KEY_DURATION_MS, KEY_COUNT},
    serial::{DEFAULT_BAUD, DEFAULT_SERIAL_TIMEOUT_MS},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod loader;

pub const DEFAULT_DEVICE: &str = "/dev/serial0";
pub const MIN_POLL_INTERVAL_MS: u64 = 50;
pub const MAX_FAILURE_THRESHOLD: u32 = 100;
const CONFIG_DIR_NAME: &str = ".vmclink";
const CONFIG_FILE_NAME: &str = "config.toml";

/// User-supplied settings loaded from the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub device: String,
    pub baud: u32,
    pub serial_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub display_page: u32,
    pub key_press_duration_ms: u32,
    pub failure_threshold: u32,
    pub key_labels: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            baud: DEFAULT_BAUD,
            serial_timeout_ms: DEFAULT_SERIAL_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            display_page: DEFAULT_DISPLAY_PAGE,
            key_press_duration_ms: DEFAULT_KEY_DURATION_MS,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            key_labels: default_key_labels(),
        }
    }
}

impl Config {
    pub fn load_or_default() -> Result<Self> {
        loader::load_or_default()
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        loader::load_from_path(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        loader::save_to_path(self, path)
    }

    /// Resolve a key given either its index or its label (case-insensitive).
    pub fn key_index(&self, raw: &str) -> Option<u8> {
        let raw = raw.trim();
        if let Ok(index) = raw.parse::<u8>() {
            return (index < KEY_COUNT).then_some(index);
        }
        self.key_labels
            .iter()
            .position(|label| label.eq_ignore_ascii_case(raw))
            .and_then(|pos| u8::try_from(pos).ok())
    }
}

pub fn default_key_labels() -> Vec<String> {
    (0..KEY_COUNT).map(|i| format!("Key {i}")).collect()
}

pub(crate) fn validate(cfg: &Config) -> Result<()> {
    if cfg.device.trim().is_empty() {
        return Err(Error::Config("device must not be empty".into()));
    }
    if cfg.baud == 0 {
        return Err(Error::Config("baud must be greater than zero".into()));
    }
    if cfg.serial_timeout_ms == 0 {
        return Err(Error::Config(
            "serial_timeout_ms must be greater than zero".into(),
        ));
    }
    if cfg.poll_interval_ms < MIN_POLL_INTERVAL_MS {
        return Err(Error::Config(format!(
            "poll_interval_ms must be at least {MIN_POLL_INTERVAL_MS}"
        )));
    }
    if cfg.key_press_duration_ms == 0 {
        return Err(Error::Config(
            "key_press_duration_ms must be greater than zero".into(),
        ));
    }
    if !(1..=MAX_FAILURE_THRESHOLD).contains(&cfg.failure_threshold) {
        return Err(Error::Config(format!(
            "failure_threshold must be between 1 and {MAX_FAILURE_THRESHOLD}"
        )));
    }
    if cfg.key_labels.len() != usize::from(KEY_COUNT) {
        return Err(Error::Config(format!(
            "key_labels must list exactly {KEY_COUNT} labels"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        validate(&Config::default()).unwrap();
    }

    #[test]
    fn resolves_keys_by_index_or_label() {
        let mut cfg = Config::default();
        cfg.key_labels[5] = "Coffee".into();
        assert_eq!(cfg.key_index("3"), Some(3));
        assert_eq!(cfg.key_index("coffee"), Some(5));
        assert_eq!(cfg.key_index("key 7"), Some(7));
        assert_eq!(cfg.key_index("8"), None);
        assert_eq!(cfg.key_index("tea"), None);
    }

    #[test]
    fn rejects_zero_threshold() {
        let cfg = Config {
            failure_threshold: 0,
            ..Config::default()
        };
        let err = validate(&cfg).unwrap_err();
        assert!(format!("{err}").contains("failure_threshold"));
    }

    #[test]
    fn rejects_short_label_list() {
        let cfg = Config {
            key_labels: vec!["only".into()],
            ..Config::default()
        };
        assert!(validate(&cfg).is_err());
    }
}
