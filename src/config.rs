use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

const APP_DIR: &str = "momentum-tui";
const DEFAULT_DEBOUNCE_MS: u64 = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub instance_url: String,
    pub api_key: String,
    pub reload_debounce: Duration,
    pub log_file: PathBuf,
}

/// `config.toml`; every key is optional.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    instance_url: Option<String>,
    api_key: Option<String>,
    reload_debounce_ms: Option<u64>,
    log_file: Option<PathBuf>,
}

impl Config {
    /// Defaults, then the config file, then the environment (`.env` included).
    pub fn load() -> Result<Config, ConfigError> {
        let file = match config_path() {
            Some(path) if path.exists() => read_file(&path)?,
            _ => FileConfig::default(),
        };
        Config::resolve(file, |key| env::var(key).ok())
    }

    fn resolve(
        file: FileConfig,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Config, ConfigError> {
        let instance_url = var("INSTANCE_URL")
            .or(file.instance_url)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("INSTANCE_URL"))?;
        let api_key = var("API_KEY")
            .or(file.api_key)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("API_KEY"))?;

        let reload_debounce_ms = match var("RELOAD_DEBOUNCE_MS") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "RELOAD_DEBOUNCE_MS",
                value: raw,
            })?,
            None => file.reload_debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS),
        };

        let log_file = var("LOG_FILE")
            .map(PathBuf::from)
            .or(file.log_file)
            .unwrap_or_else(default_log_file);

        Ok(Config {
            instance_url: instance_url.trim().trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            reload_debounce: Duration::from_millis(reload_debounce_ms),
            log_file,
        })
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&raw)?)
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

fn default_log_file() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(env::temp_dir)
        .join(APP_DIR)
        .join("momentum.log")
}
