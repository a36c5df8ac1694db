use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{FileStateStore, MemoryStateStore, RecordKey, StateStore, StoreError, StateStoreConfig};
use crate::auth::{
    AppAccessToken, AuthorizationSession, ClientCredentials, ReceivedCode, UserAccessToken,
};

/// Typed access to the records shared by both processes.
///
/// Each setter replaces one record wholesale. Nothing here caches: every
/// getter goes back to the backend, which is what lets a poller observe a
/// write made by another process.
#[derive(Clone)]
pub struct PersistedState {
    store: Arc<dyn StateStore>,
}

impl std::fmt::Debug for PersistedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedState").field("store", &"..").finish()
    }
}

impl PersistedState {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// State backed by a directory of record files.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileStateStore::new(StateStoreConfig::new(
            dir.into(),
        ))))
    }

    /// State held in process memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStateStore::new()))
    }

    fn read<T: DeserializeOwned>(&self, key: RecordKey) -> Result<Option<T>, StoreError> {
        match self.store.load(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, key: RecordKey, record: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(record)?;
        self.store.save(key, &value)
    }

    pub fn client_credentials(&self) -> Result<Option<ClientCredentials>, StoreError> {
        self.read(RecordKey::ClientCredentials)
    }

    pub fn set_client_credentials(&self, credentials: &ClientCredentials) -> Result<(), StoreError> {
        self.write(RecordKey::ClientCredentials, credentials)
    }

    pub fn clear_client_credentials(&self) -> Result<(), StoreError> {
        self.store.clear(RecordKey::ClientCredentials)
    }

    pub fn app_token(&self) -> Result<Option<AppAccessToken>, StoreError> {
        self.read(RecordKey::AppToken)
    }

    pub fn set_app_token(&self, token: &AppAccessToken) -> Result<(), StoreError> {
        self.write(RecordKey::AppToken, token)
    }

    pub fn clear_app_token(&self) -> Result<(), StoreError> {
        self.store.clear(RecordKey::AppToken)
    }

    pub fn user_token(&self) -> Result<Option<UserAccessToken>, StoreError> {
        self.read(RecordKey::UserToken)
    }

    pub fn set_user_token(&self, token: &UserAccessToken) -> Result<(), StoreError> {
        self.write(RecordKey::UserToken, token)
    }

    pub fn clear_user_token(&self) -> Result<(), StoreError> {
        self.store.clear(RecordKey::UserToken)
    }

    pub fn session(&self) -> Result<Option<AuthorizationSession>, StoreError> {
        self.read(RecordKey::AuthorizationSession)
    }

    pub fn set_session(&self, session: &AuthorizationSession) -> Result<(), StoreError> {
        self.write(RecordKey::AuthorizationSession, session)
    }

    /// Remove the session and any code delivered for it.
    pub fn clear_session(&self) -> Result<(), StoreError> {
        self.store.clear(RecordKey::AuthorizationSession)?;
        self.store.clear(RecordKey::AuthorizationCode)
    }

    /// Last code written by the callback receiver, whatever its nonce.
    pub fn received_code(&self) -> Result<Option<ReceivedCode>, StoreError> {
        self.read(RecordKey::AuthorizationCode)
    }

    pub fn set_received_code(&self, code: &ReceivedCode) -> Result<(), StoreError> {
        self.write(RecordKey::AuthorizationCode, code)
    }

    /// Code delivered for the current session, if the callback already landed.
    ///
    /// A code record without a session, or tagged with another nonce, does
    /// not count.
    pub fn pending_code(&self) -> Result<Option<String>, StoreError> {
        let Some(session) = self.session()? else {
            return Ok(None);
        };
        Ok(self
            .received_code()?
            .filter(|code| session.owns(code))
            .map(|code| code.code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn user_token() -> UserAccessToken {
        UserAccessToken {
            access_token: "user".into(),
            token_type: "Bearer".into(),
            refresh_token: Some("r1".into()),
            scope: None,
            expires_at: Utc::now() + Duration::seconds(3600),
        }
    }

    #[test]
    fn records_survive_a_new_handle_on_the_same_dir() {
        let dir = TempDir::new().unwrap();
        let first = PersistedState::in_dir(dir.path());
        let token = user_token();
        first.set_user_token(&token).unwrap();

        let second = PersistedState::in_dir(dir.path());
        assert_eq!(second.user_token().unwrap(), Some(token));
    }

    #[test]
    fn pending_code_requires_a_matching_session() {
        let state = PersistedState::in_memory();
        assert_eq!(state.pending_code().unwrap(), None);

        state
            .set_session(&AuthorizationSession::with_state("n"))
            .unwrap();
        assert_eq!(state.pending_code().unwrap(), None);

        state
            .set_received_code(&ReceivedCode::new("n", "code-1"))
            .unwrap();
        assert_eq!(state.pending_code().unwrap().as_deref(), Some("code-1"));

        state.clear_session().unwrap();
        assert_eq!(state.session().unwrap(), None);
        assert_eq!(state.received_code().unwrap(), None);
    }

    #[test]
    fn code_written_after_teardown_is_inert() {
        let state = PersistedState::in_memory();
        state
            .set_session(&AuthorizationSession::with_state("old"))
            .unwrap();
        state.clear_session().unwrap();
        // A receiver that validated "old" before the teardown writes late.
        state
            .set_received_code(&ReceivedCode::new("old", "late"))
            .unwrap();
        assert_eq!(state.pending_code().unwrap(), None);

        state
            .set_session(&AuthorizationSession::with_state("new"))
            .unwrap();
        assert_eq!(state.pending_code().unwrap(), None);
    }

    #[test]
    fn clearing_one_record_keeps_the_others() {
        let state = PersistedState::in_memory();
        state
            .set_client_credentials(&ClientCredentials::new("id", "secret"))
            .unwrap();
        state.set_user_token(&user_token()).unwrap();
        state.clear_user_token().unwrap();
        assert!(state.user_token().unwrap().is_none());
        assert!(state.client_credentials().unwrap().is_some());
    }
}
