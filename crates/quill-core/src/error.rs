//! Unified error types for the Quill core.
//!
//! Transport failures come from the messaging backend and are surfaced as
//! [`TransportError`]. The channel store wraps them in [`StoreError`] together
//! with its own serialization failures.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors raised by a [`Transport`](crate::Transport) implementation.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The backend rejected or failed to deliver a message.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// A channel, org or account the call referred to does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// What kind of object was missing (e.g. "channel").
        kind: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// Any other backend failure.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Creates a not-found error for a channel.
    pub fn channel_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "channel",
            id: id.into(),
        }
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors that can occur in channel store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A search or channel call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A value could not be encoded into a record, or decoded into the
    /// requested type.
    #[error("record serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for channel store operations.
pub type StoreResult<T> = Result<T, StoreError>;
