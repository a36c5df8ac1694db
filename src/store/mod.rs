//! Persisted key-value state shared between the orchestrator and the
//! callback receiver.
//!
//! Every record is written as a whole; a reader sees either the previous
//! record or the new one, never a mix. Backends only deal in JSON values, the
//! typed view lives in [`PersistedState`].

pub mod file;
pub mod memory;
pub mod state;

use std::fmt;

use thiserror::Error;

pub use file::{FileStateStore, StateStoreConfig};
pub use memory::MemoryStateStore;
pub use state::PersistedState;

/// Named records held in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKey {
    ClientCredentials,
    AppToken,
    UserToken,
    AuthorizationSession,
    AuthorizationCode,
}

impl RecordKey {
    pub const ALL: [RecordKey; 5] = [
        RecordKey::ClientCredentials,
        RecordKey::AppToken,
        RecordKey::UserToken,
        RecordKey::AuthorizationSession,
        RecordKey::AuthorizationCode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientCredentials => "client",
            Self::AppToken => "app_access",
            Self::UserToken => "user_auth",
            Self::AuthorizationSession => "auth_session",
            Self::AuthorizationCode => "auth_code",
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by state store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Unsupported record version {found} for {key}")]
    UnsupportedVersion { key: RecordKey, found: u32 },
}

impl From<std::io::Error> for StoreError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Storage abstraction for persisted records.
///
/// A backend may be a directory of files, process memory, or anything else
/// that gives whole-record replacement semantics.
pub trait StateStore: Send + Sync {
    fn load(&self, key: RecordKey) -> Result<Option<serde_json::Value>, StoreError>;
    fn save(&self, key: RecordKey, value: &serde_json::Value) -> Result<(), StoreError>;
    fn clear(&self, key: RecordKey) -> Result<(), StoreError>;
}
