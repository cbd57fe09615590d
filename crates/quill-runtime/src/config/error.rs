//! Why a [`QuillConfig`](super::QuillConfig) could not be assembled.
//!
//! Every variant is fatal: the runtime refuses to start a bot whose
//! settings do not load or do not validate. Setting keys are reported in
//! their dotted form (`bot.username`), the same form `QUILL_BOT__USERNAME`
//! and [`ConfigLoader::set`](super::ConfigLoader::set) use.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// A file passed to [`ConfigLoader::file`](super::ConfigLoader::file)
    /// does not exist. Search-path files are optional and never raise this.
    #[error("config file {} does not exist", .0.display())]
    FileNotFound(PathBuf),

    /// The file extension has no format behind it (e.g. `.toml` with the
    /// `toml-config` feature off).
    #[error("config file format `.{0}` is not supported by this build")]
    UnsupportedFormat(String),

    /// The merged sources do not fit the schema, such as a number field
    /// given a word.
    #[error("cannot read configuration: {0}")]
    Unreadable(String),

    /// A required setting is empty.
    #[error("setting `{key}` is required")]
    Missing { key: String },

    /// A setting is present but unusable.
    #[error("setting `{key}` is invalid: {reason}")]
    Invalid { key: String, reason: String },
}

impl ConfigError {
    pub fn missing(key: impl Into<String>) -> Self {
        Self::Missing { key: key.into() }
    }

    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// The dotted key of the offending setting, when there is one.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Missing { key } | Self::Invalid { key, .. } => Some(key),
            _ => None,
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Unreadable(err.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
