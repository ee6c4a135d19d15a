//! Application configuration.
//!
//! Values come from `config.toml`, then `GEU_*` environment variables, then defaults.

use serde::Deserialize;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Directory name used under the user's data and config directories.
pub const APP_NAME: &str = "gnome-extension-updater";

/// Decision service queried for extension updates.
pub const DEFAULT_UPDATE_URL: &str = "https://extensions.gnome.org/update-info/";

/// Request timeout when the config file sets none.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// File looked up in the user config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config file {path}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The config file is not valid TOML or has unknown keys.
    #[error("failed to parse config file {path}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: toml::de::Error,
    },

    /// A required XDG directory is unknown.
    #[error("could not determine the user's {0} directory")]
    NoDirectory(&'static str),
}

/// Runtime settings loaded from environment variables.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// `GEU_UPDATE_URL`
    pub update_url: Option<String>,
    /// `GEU_DATA_DIR`
    pub data_dir: Option<PathBuf>,
}

impl Settings {
    /// Load settings from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            update_url: env::var("GEU_UPDATE_URL").ok().filter(|v| !v.is_empty()),
            data_dir: env::var_os("GEU_DATA_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }
}

/// Optional values read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Decision service endpoint.
    pub update_url: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Backup, journal and lock directory.
    pub data_dir: Option<PathBuf>,
    /// Per-user extension directory.
    pub extensions_dir: Option<PathBuf>,
}

impl FileConfig {
    /// Read `path`, returning defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file exists but cannot be read.
    /// Returns [`ConfigError::Parse`] if the file is not valid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// All application configuration, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Decision service endpoint.
    pub update_url: String,
    /// Timeout for each request to the decision service.
    pub timeout: Duration,
    /// Where backups, the update journal and the instance lock live.
    pub data_dir: PathBuf,
    /// Per-user extension directory that gets archived before an update.
    pub extensions_dir: PathBuf,
}

impl Config {
    /// `$XDG_CONFIG_HOME/gnome-extension-updater/config.toml`
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load the config file (if any) and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file is invalid or a default directory cannot be found.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::from_parts(file, Settings::from_env())
    }

    /// Merge file values and environment settings; the environment wins.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoDirectory`] if a directory is unset and has no default.
    pub fn from_parts(file: FileConfig, settings: Settings) -> Result<Self, ConfigError> {
        let update_url = settings
            .update_url
            .or(file.update_url)
            .unwrap_or_else(|| DEFAULT_UPDATE_URL.to_owned());

        let data_dir = match settings.data_dir.or(file.data_dir) {
            Some(dir) => dir,
            None => dirs::data_dir()
                .map(|dir| dir.join(APP_NAME))
                .ok_or(ConfigError::NoDirectory("data"))?,
        };

        let extensions_dir = match file.extensions_dir {
            Some(dir) => dir,
            None => dirs::data_dir()
                .map(|dir| dir.join("gnome-shell").join("extensions"))
                .ok_or(ConfigError::NoDirectory("data"))?,
        };

        Ok(Self {
            update_url,
            timeout: Duration::from_secs(file.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            data_dir,
            extensions_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_with_dirs() -> FileConfig {
        FileConfig {
            data_dir: Some(PathBuf::from("/tmp/geu-data")),
            extensions_dir: Some(PathBuf::from("/tmp/geu-ext")),
            ..FileConfig::default()
        }
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::from_parts(file_with_dirs(), Settings::default()).unwrap();
        assert_eq!(config.update_url, DEFAULT_UPDATE_URL);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/geu-data"));
        assert_eq!(config.extensions_dir, PathBuf::from("/tmp/geu-ext"));
    }

    #[test]
    fn environment_overrides_file() {
        let file = FileConfig {
            update_url: Some("https://file.example/update-info/".into()),
            timeout_secs: Some(12),
            ..file_with_dirs()
        };
        let settings = Settings {
            update_url: Some("https://env.example/update-info/".into()),
            data_dir: Some(PathBuf::from("/tmp/env-data")),
        };

        let config = Config::from_parts(file, settings).unwrap();
        assert_eq!(config.update_url, "https://env.example/update-info/");
        assert_eq!(config.timeout, Duration::from_secs(12));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/env-data"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(file, FileConfig::default());
    }

    #[test]
    fn file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "update_url = \"http://localhost:8080/update-info/\"\ntimeout_secs = 2\n",
        )
        .unwrap();

        let file = FileConfig::load(&path).unwrap();
        assert_eq!(
            file.update_url.as_deref(),
            Some("http://localhost:8080/update-info/")
        );
        assert_eq!(file.timeout_secs, Some(2));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "retries = 3\n").unwrap();

        let err = FileConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
