use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::types::BwrapperConfig;
use crate::error::{BwrapperError, Result};

/// Get the default configuration file path
pub fn get_config_path() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "bwrapper", "bwrapper") {
        proj_dirs.config_dir().join("config.toml")
    } else {
        // Fallback to home directory
        dirs_fallback().join(".bwrapper").join("config.toml")
    }
}

fn dirs_fallback() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load configuration from file, with defaults for missing values.
///
/// An explicitly requested file must exist; the default location may be absent.
pub fn load_config(config_path: Option<&Path>) -> Result<BwrapperConfig> {
    let path = match config_path {
        Some(path) => {
            if !path.exists() {
                return Err(BwrapperError::ConfigNotFound {
                    path: path.display().to_string(),
                });
            }
            path.to_path_buf()
        }
        None => {
            let path = get_config_path();
            if !path.exists() {
                debug!(path = %path.display(), "No configuration file, using defaults");
                return Ok(BwrapperConfig::default());
            }
            path
        }
    };

    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    debug!(path = %path.display(), "Loaded configuration");

    Ok(config)
}

pub fn parse_config(content: &str) -> Result<BwrapperConfig> {
    toml::from_str(content).map_err(|e| BwrapperError::TomlParse(e.to_string()))
}
