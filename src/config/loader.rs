use std::{
    fs,
    path::{Path, PathBuf},
};

use directories::BaseDirs;

use crate::{Error, Result};

use super::{Config, CONFIG_DIR_NAME, CONFIG_FILE_NAME};

pub fn load_or_default() -> Result<Config> {
    load_or_create(&config_path()?)
}

/// Load `path`, writing the defaults there first when it does not exist yet.
pub fn load_or_create(path: &Path) -> Result<Config> {
    if !path.exists() {
        let cfg = Config::default();
        save_to_path(&cfg, path)?;
        super::validate(&cfg)?;
        return Ok(cfg);
    }
    load_from_path(path)
}

pub fn load_from_path(path: &Path) -> Result<Config> {
    if !path.exists() {
        let cfg = Config::default();
        super::validate(&cfg)?;
        return Ok(cfg);
    }

    let raw = fs::read_to_string(path)?;
    parse(&raw)
}

pub fn save_to_path(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("cannot serialize config: {e}")))?;
    fs::write(path, format!("# vmclink config\n{body}"))?;
    Ok(())
}

pub fn parse(raw: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(raw).map_err(|e| Error::Parse(e.message().to_string()))?;
    super::validate(&cfg)?;
    Ok(cfg)
}

pub fn config_path() -> Result<PathBuf> {
    let dirs = BaseDirs::new()
        .ok_or_else(|| Error::Config("HOME not set; cannot locate config directory".into()))?;
    Ok(dirs.home_dir().join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
