//! Error types for tokenrelay.

use std::fmt;

use thiserror::Error;

use crate::store::StoreError;

/// Primary error type for all tokenrelay operations.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The authorization server answered a token request with a non-200 status.
    #[error("Authorization server error (status {status}): {body}")]
    Auth { status: u16, body: serde_json::Value },

    /// The authorization callback never arrived within the polling ceiling.
    #[error("Timed out after {0}ms waiting for the authorization callback")]
    Timeout(u64),

    /// A callback carried a `state` value that does not match the session nonce.
    #[error("State mismatch")]
    StateMismatch,

    /// A resource endpoint answered with a non-200 status.
    #[error("Fetch of {url} failed (status {status}): {body}")]
    Fetch {
        url: String,
        status: u16,
        body: serde_json::Value,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Coarse classification used for logging and exit decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Timeout,
    StateMismatch,
    Fetch,
    Network,
    Configuration,
    Storage,
    Serialization,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Authentication => "authentication",
            Self::Timeout => "timeout",
            Self::StateMismatch => "state_mismatch",
            Self::Fetch => "fetch",
            Self::Network => "network",
            Self::Configuration => "configuration",
            Self::Storage => "storage",
            Self::Serialization => "serialization",
            Self::Internal => "internal",
        };
        f.write_str(label)
    }
}

impl RelayError {
    /// Build an authorization error from a raw status and response body.
    pub fn auth(status: u16, body: serde_json::Value) -> Self {
        Self::Auth { status, body }
    }

    /// Build a fetch error for a resource URL.
    pub fn fetch(url: impl Into<String>, status: u16, body: serde_json::Value) -> Self {
        Self::Fetch {
            url: url.into(),
            status,
            body,
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Auth { .. } => ErrorCategory::Authentication,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::StateMismatch => ErrorCategory::StateMismatch,
            Self::Fetch { .. } => ErrorCategory::Fetch,
            Self::Network(_) => ErrorCategory::Network,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Io(_) | Self::Store(_) => ErrorCategory::Storage,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::InvalidState(_) => ErrorCategory::Internal,
        }
    }

    /// Whether the current run has to stop.
    ///
    /// Token acquisition failures leave the run without a usable credential.
    /// Fetch failures are recovered by returning what was already collected.
    pub fn is_fatal(&self) -> bool {
        !matches!(self.category(), ErrorCategory::Fetch)
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } | Self::Fetch { status, .. } => Some(*status),
            Self::StateMismatch => Some(400),
            _ => None,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, RelayError>;
