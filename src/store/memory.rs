use std::collections::HashMap;
use std::sync::Mutex;

use super::{RecordKey, StateStore, StoreError};

/// In-process state store.
///
/// Suitable when the orchestrator and the callback receiver run as tasks in
/// the same process, and for tests.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<RecordKey, serde_json::Value>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<RecordKey, serde_json::Value>>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Io("memory store lock poisoned".to_string()))
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, key: RecordKey) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.lock()?.get(&key).cloned())
    }

    fn save(&self, key: RecordKey, value: &serde_json::Value) -> Result<(), StoreError> {
        self.lock()?.insert(key, value.clone());
        Ok(())
    }

    fn clear(&self, key: RecordKey) -> Result<(), StoreError> {
        self.lock()?.remove(&key);
        Ok(())
    }
}
