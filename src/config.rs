use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{AppError, AppResult};

const CONFIG_PATH_ENV: &str = "TWEET_UPLOADER_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,
    pub api_base_url: String,
    pub upload_url: String,
    pub post_url_base: String,
    pub request_timeout_secs: u64,
    pub max_media_bytes: u64,
    pub temp_dir: Option<PathBuf>,
    pub log_level: String,
    /// Let `mediaUrl` point at loopback, private and link-local hosts
    pub allow_private_media_hosts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            api_base_url: "https://api.x.com".to_string(),
            upload_url: "https://api.x.com/2/media/upload".to_string(),
            post_url_base: "https://x.com/i/web/status".to_string(),
            request_timeout_secs: 120,
            max_media_bytes: 512 * 1024 * 1024, // X's video ceiling
            temp_dir: None,
            log_level: "info".to_string(),
            allow_private_media_hosts: false,
        }
    }
}

fn get_config_path() -> AppResult<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| AppError::Config("Could not find config directory".to_string()))?
        .join("tweet-uploader");

    Ok(config_dir.join("config.json"))
}

/// Load the config file, writing defaults when none exists, then apply
/// environment overrides. Runs before logging is set up, so notices go to
/// stderr.
pub fn load_config() -> AppResult<Config> {
    let config_path = get_config_path()?;

    let mut config = if config_path.exists() {
        let config_str = fs::read_to_string(&config_path)?;
        serde_json::from_str(&config_str).unwrap_or_else(|e| {
            eprintln!(
                "Failed to parse config file {}: {}. Using defaults.",
                config_path.display(),
                e
            );
            Config::default()
        })
    } else {
        let default_config = Config::default();
        if let Err(e) = save_config(&default_config, &config_path) {
            eprintln!(
                "Could not write default config to {}: {}",
                config_path.display(),
                e
            );
        }
        default_config
    };

    apply_env_overrides(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}

fn save_config(config: &Config, config_path: &Path) -> AppResult<()> {
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(config_path, config_str)?;

    eprintln!("Default configuration written to {}", config_path.display());
    Ok(())
}

fn apply_env_overrides(config: &mut Config) -> AppResult<()> {
    if let Ok(port) = std::env::var("PORT") {
        config.port = port
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("PORT is not a valid port: {}", port)))?;
    }
    Ok(())
}

/// Staging directory for inbound media, created on demand
pub fn get_temp_directory(config: &Config) -> AppResult<PathBuf> {
    let temp_dir = config
        .temp_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("tweet_uploader"));
    fs::create_dir_all(&temp_dir)?;
    Ok(temp_dir)
}

pub fn validate_config(config: &Config) -> AppResult<()> {
    if config.port == 0 {
        return Err(AppError::validation("port", "Must be between 1 and 65535"));
    }

    if config.request_timeout_secs == 0 {
        return Err(AppError::validation(
            "request_timeout_secs",
            "Must be greater than 0",
        ));
    }

    if config.max_media_bytes == 0 {
        return Err(AppError::validation(
            "max_media_bytes",
            "Must be greater than 0",
        ));
    }

    for (field, url) in [
        ("api_base_url", &config.api_base_url),
        ("upload_url", &config.upload_url),
        ("post_url_base", &config.post_url_base),
    ] {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(AppError::validation(field, "Must be an http(s) URL"));
        }
    }

    // Validate log level
    let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
    if !valid_log_levels.contains(&config.log_level.as_str()) {
        return Err(AppError::validation("log_level", "Must be a valid log level"));
    }

    Ok(())
}
