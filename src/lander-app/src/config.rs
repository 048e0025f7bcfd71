// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name searched for in every config directory.
pub const CONFIG_FILE_NAME: &str = "lander.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),
}

/// Default search paths for `lander.toml`
/// (current directory → XDG config → /etc).
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("lander").join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from("/etc/lander").join(CONFIG_FILE_NAME));
    paths
}

/// Deserialize the `[key]` section of a TOML document.
///
/// `origin` is only used for error messages. Returns `Ok(None)` when the
/// section is absent.
fn parse_section<T: DeserializeOwned>(
    content: &str,
    key: &str,
    origin: &Path,
) -> Result<Option<T>, ConfigError> {
    let parse_err = |e: String| ConfigError::ParseError(origin.to_path_buf(), e);

    let mut table: toml::Table = toml::from_str(content).map_err(|e| parse_err(e.to_string()))?;
    let Some(section) = table.remove(key) else {
        return Ok(None);
    };

    // Going through the section value keeps serde defaults for missing keys.
    section
        .try_into::<T>()
        .map(Some)
        .map_err(|e| parse_err(e.to_string()))
}

fn load_section_from_file<T: DeserializeOwned>(
    path: &Path,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;
    parse_section(&content, key, path)
}

/// Trait for loading configuration from a `lander.toml` section.
pub trait ConfigFile: Sized + Default + DeserializeOwned {
    /// Section key in `lander.toml` (e.g. `"lander-server"`).
    fn section_key() -> &'static str;

    /// Parse the section out of an in-memory TOML document.
    fn load_from_str(content: &str) -> Result<Self, ConfigError> {
        let origin = Path::new("<inline>");
        parse_section::<Self>(content, Self::section_key(), origin)?
            .ok_or_else(|| missing_section::<Self>(origin))
    }

    /// Load the section from a specific file path.
    ///
    /// Fails if the file cannot be read, is not valid TOML, or has no
    /// `[<section_key>]` table.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        load_section_from_file::<Self>(path, Self::section_key())?
            .ok_or_else(|| missing_section::<Self>(path))
    }

    /// Search the default paths and load the first file that contains the
    /// expected section.
    ///
    /// Returns `(config, path_where_found)` or `(Default::default(), None)`
    /// when no config file is found.
    fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in config_search_paths() {
            if path.exists() {
                if let Some(cfg) = load_section_from_file::<Self>(&path, Self::section_key())? {
                    return Ok((cfg, Some(path)));
                }
            }
        }
        Ok((Self::default(), None))
    }

    /// Load from `path` when given, otherwise from the default paths.
    fn load(path: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        match path {
            Some(path) => Ok((Self::load_from_file(path)?, Some(path.to_path_buf()))),
            None => Self::load_from_default_paths(),
        }
    }
}

fn missing_section<T: ConfigFile>(path: &Path) -> ConfigError {
    ConfigError::ParseError(
        path.to_path_buf(),
        format!("missing [{}] section", T::section_key()),
    )
}
