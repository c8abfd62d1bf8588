/// Application configuration
///
/// Read from `config.toml` in the user's config directory:
/// - Linux: ~/.config/typst-graphic/config.toml
/// - macOS: ~/Library/Application Support/typst-graphic/config.toml
/// - Windows: %APPDATA%\typst-graphic\config.toml
///
/// Every field is optional; a missing file means defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::state::edit::DEFAULT_FONT_SIZE;

const APP_DIR: &str = "typst-graphic";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where the handle store and preferences live
    pub data_dir: PathBuf,
    /// `typst` executable used for compilation
    pub typst_binary: PathBuf,
    /// Extra font directories passed to the compiler
    pub font_paths: Vec<PathBuf>,
    /// Font size for a first run, before any setting was saved
    pub default_font_size: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            typst_binary: PathBuf::from("typst"),
            font_paths: Vec::new(),
            default_font_size: DEFAULT_FONT_SIZE,
        }
    }
}

fn default_data_dir() -> PathBuf {
    let mut path = dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    path
}

impl Config {
    /// Default location of the config file, if the platform has one
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
