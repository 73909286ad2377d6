//! Service configuration.
//!
//! # Load Order
//!
//! 1. Default values
//! 2. TOML file, when one is given to [`ConfigLoader::with_file`]
//! 3. Environment variables (`DENTAL_*`)
//!
//! Each layer overrides the previous.
//!
//! ```toml
//! [database]
//! path = "data/marketplace.db"
//! temporary = false
//!
//! [messaging]
//! preview_length = 50
//! event_name = "new-message"
//!
//! [uploads]
//! key_prefix = "models"
//! ```
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const ENV_DB_PATH: &str = "DENTAL_DB_PATH";
pub const ENV_DB_TEMPORARY: &str = "DENTAL_DB_TEMPORARY";
pub const ENV_PREVIEW_LENGTH: &str = "DENTAL_PREVIEW_LENGTH";
pub const ENV_EVENT_NAME: &str = "DENTAL_REALTIME_EVENT";
pub const ENV_MODEL_PREFIX: &str = "DENTAL_MODEL_PREFIX";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for environment variable '{name}': {message}")]
    InvalidEnvVar { name: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketplaceConfig {
    pub database: DatabaseConfig,
    pub messaging: MessagingConfig,
    pub uploads: UploadConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// Delete the database when the handle is dropped.
    pub temporary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Characters of message content shown in unseen-message previews.
    pub preview_length: usize,
    /// Realtime event name used when a message is published.
    pub event_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub key_prefix: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/marketplace.db"),
            temporary: false,
        }
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            preview_length: 50,
            event_name: "new-message".to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            key_prefix: "models".to_string(),
        }
    }
}

impl MarketplaceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.messaging.preview_length == 0 {
            return Err(ConfigError::Invalid(
                "messaging.preview_length must be positive".into(),
            ));
        }
        if self.messaging.event_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "messaging.event_name must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Opens the configured sled database.
    pub fn open_database(&self) -> sled::Result<sled::Db> {
        sled::Config::new()
            .path(&self.database.path)
            .temporary(self.database.temporary)
            .open()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Layered configuration loader.
///
/// ```ignore
/// let config = ConfigLoader::new()
///     .with_file("marketplace.toml")
///     .skip_env_vars() // tests
///     .load()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    skip_env: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    pub fn load(&self) -> Result<MarketplaceConfig, ConfigError> {
        let mut config = match &self.file {
            Some(path) => Self::load_file(path)?,
            None => MarketplaceConfig::default(),
        };

        if !self.skip_env {
            Self::apply_env(&mut config, |name| std::env::var(name).ok())?;
        }

        config.validate()?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<MarketplaceConfig, ConfigError> {
        debug!(path = %path.display(), "loading config file");
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })
    }

    // `lookup` stands in for the process environment so overrides are testable
    fn apply_env(
        config: &mut MarketplaceConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(path) = lookup(ENV_DB_PATH) {
            config.database.path = PathBuf::from(path);
        }
        if let Some(value) = lookup(ENV_DB_TEMPORARY) {
            config.database.temporary =
                parse_bool(&value).ok_or_else(|| ConfigError::InvalidEnvVar {
                    name: ENV_DB_TEMPORARY.into(),
                    message: "expected bool".into(),
                })?;
        }
        if let Some(value) = lookup(ENV_PREVIEW_LENGTH) {
            config.messaging.preview_length =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidEnvVar {
                        name: ENV_PREVIEW_LENGTH.into(),
                        message: "expected positive integer".into(),
                    })?;
        }
        if let Some(event) = lookup(ENV_EVENT_NAME) {
            config.messaging.event_name = event;
        }
        if let Some(prefix) = lookup(ENV_MODEL_PREFIX) {
            config.uploads.key_prefix = prefix;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = ConfigLoader::new().skip_env_vars().load().unwrap();
        assert_eq!(config, MarketplaceConfig::default());
        assert_eq!(config.messaging.preview_length, 50);
        assert_eq!(config.messaging.event_name, "new-message");
    }

    #[test]
    fn file_overrides_defaults_partially() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marketplace.toml");
        std::fs::write(
            &path,
            "[database]\npath = \"/tmp/dental.db\"\n\n[messaging]\npreview_length = 20\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_file(&path)
            .skip_env_vars()
            .load()
            .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/tmp/dental.db"));
        assert_eq!(config.messaging.preview_length, 20);
        assert_eq!(config.messaging.event_name, "new-message");
        assert_eq!(config.uploads.key_prefix, "models");
    }

    #[test]
    fn malformed_file_is_reported_with_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[messaging\npreview_length = ").unwrap();

        let err = ConfigLoader::new()
            .with_file(&path)
            .skip_env_vars()
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParseToml { .. }));
    }

    #[test]
    fn env_overrides_apply_last() {
        let env: HashMap<&str, &str> = [
            (ENV_DB_TEMPORARY, "yes"),
            (ENV_PREVIEW_LENGTH, "12"),
            (ENV_MODEL_PREFIX, "scans"),
        ]
        .into_iter()
        .collect();

        let mut config = MarketplaceConfig::default();
        ConfigLoader::apply_env(&mut config, |name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert!(config.database.temporary);
        assert_eq!(config.messaging.preview_length, 12);
        assert_eq!(config.uploads.key_prefix, "scans");
    }

    #[test]
    fn bad_env_values_are_rejected() {
        let mut config = MarketplaceConfig::default();
        let err = ConfigLoader::apply_env(&mut config, |name| {
            (name == ENV_DB_TEMPORARY).then(|| "sometimes".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));
    }

    #[test]
    fn zero_preview_length_is_invalid() {
        let mut config = MarketplaceConfig::default();
        config.messaging.preview_length = 0;
        assert!(config.validate().is_err());
    }
}
