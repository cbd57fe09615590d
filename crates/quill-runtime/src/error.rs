//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use quill_core::{StoreError, TransportError};

/// Errors that can occur while building or running a bot.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The transport failed outside the outbound queue.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The channel store could not be opened.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A background task panicked or was aborted.
    #[error("Task failed: {0}")]
    TaskJoin(String),
}

impl From<tokio::task::JoinError> for RuntimeError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
