pub mod chat;
pub mod config_cmd;

use std::path::{Path, PathBuf};

use roleplayer_config::{AppConfig, ConfigError};

/// The config file in use: `--config` if given, else the default location.
pub fn config_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// Load the config file with environment overrides applied.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut config = AppConfig::load_from(&config_path(path))?;
    config.apply_env();
    Ok(config)
}
