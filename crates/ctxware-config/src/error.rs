//! Configuration errors.
//!
//! Every variant is fatal at startup. Variants that come from one setting
//! name it, as a dotted path (`limit.remote_limit`) or as the environment
//! variable that carried it.

use std::path::PathBuf;

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A configuration source could not be loaded, or loaded to invalid values.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required configuration file does not exist.
    #[error("configuration file {} does not exist", path.display())]
    FileNotFound {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// A configuration file exists but could not be read.
    #[error("cannot read configuration file {}", path.display())]
    Unreadable {
        /// The file.
        path: PathBuf,
        /// The I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The format is neither `toml` nor `json`.
    #[error("unsupported configuration format '{0}', expected 'toml' or 'json'")]
    UnsupportedFormat(String),

    /// The document does not match the configuration tree, including
    /// unknown keys in any section.
    #[error("invalid {format} configuration: {source}")]
    Parse {
        /// `toml` or `json`.
        format: &'static str,
        /// The deserializer's error.
        #[source]
        source: BoxError,
    },

    /// A `.env` file exists but could not be loaded.
    #[error("cannot load .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),

    /// A setting parsed but is out of range.
    #[error("{field}: {reason}")]
    InvalidValue {
        /// Dotted path of the setting.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An override variable under the prefix could not be applied.
    #[error("environment variable {var}: {reason}")]
    InvalidEnv {
        /// The variable name.
        var: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    /// Reports an out-of-range setting.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Reports an override variable that cannot be applied.
    pub fn invalid_env(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEnv {
            var: var.into(),
            reason: reason.into(),
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse {
            format: "toml",
            source: Box::new(err),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse {
            format: "json",
            source: Box::new(err),
        }
    }
}
