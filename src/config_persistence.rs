use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::{sanitize_config, Config};

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR_NAME: &str = "kexplorer";

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|path| path.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_FILE_NAME)
}

pub fn default_durable_cache_path() -> PathBuf {
    dirs::data_dir()
        .map(|path| path.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cache.db")
}

pub fn persist_config_file(config: &Config, path: &Path) {
    let config_text = match toml::to_string(config) {
        Ok(text) => text,
        Err(err) => {
            log::error!("Failed to serialize config for {}: {}", path.display(), err);
            return;
        }
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                log::error!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    err
                );
                return;
            }
        }
    }

    if let Err(err) = std::fs::write(path, config_text) {
        log::error!("Failed to persist config to {}: {}", path.display(), err);
    }
}

/// Reads `path`, writing a default config first when none exists.
///
/// Unreadable or unparsable files fall back to defaults; the file on disk is
/// left untouched in that case so a typo never wipes user settings.
pub fn load_config_file(path: &Path) -> Config {
    if !path.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        let default_config = Config::default();
        persist_config_file(&default_config, path);
        return default_config;
    }

    let config_content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!(
                "Failed to read config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            return Config::default();
        }
    };

    match toml::from_str::<Config>(&config_content) {
        Ok(config) => sanitize_config(config),
        Err(err) => {
            warn!(
                "Failed to parse config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            Config::default()
        }
    }
}
