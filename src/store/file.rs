use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RecordKey, StateStore, StoreError};

const RECORD_FILE_VERSION: u32 = 1;

/// Configuration for file-backed state storage.
#[derive(Debug, Clone)]
pub struct StateStoreConfig {
    pub base_dir: PathBuf,
}

impl StateStoreConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_dir() -> PathBuf {
        default_state_dir()
    }
}

/// File-backed state store: one JSON file per record.
///
/// Files are replaced through a temp file and a rename, so a process polling
/// the directory never reads a half-written record.
///
/// # Example
/// ```no_run
/// use tokenrelay::store::{FileStateStore, RecordKey, StateStore, StateStoreConfig};
///
/// let store = FileStateStore::new(StateStoreConfig::new("/tmp/relay".into()));
/// store.save(RecordKey::AppToken, &serde_json::json!({"access_token": "abc"}))?;
/// # Ok::<(), tokenrelay::store::StoreError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileStateStore {
    base_dir: PathBuf,
}

impl FileStateStore {
    pub fn new(config: StateStoreConfig) -> Self {
        Self {
            base_dir: config.base_dir,
        }
    }

    pub fn new_default() -> Self {
        Self {
            base_dir: default_state_dir(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn record_path(&self, key: RecordKey) -> PathBuf {
        self.base_dir.join(format!("{}.json", key.as_str()))
    }
}

impl StateStore for FileStateStore {
    fn load(&self, key: RecordKey) -> Result<Option<serde_json::Value>, StoreError> {
        let path = self.record_path(key);
        let raw = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::Io(err.to_string())),
        };
        let file: RecordFile = serde_json::from_str(&raw)?;
        if file.version != RECORD_FILE_VERSION {
            return Err(StoreError::UnsupportedVersion {
                key,
                found: file.version,
            });
        }
        Ok(Some(file.record))
    }

    fn save(&self, key: RecordKey, value: &serde_json::Value) -> Result<(), StoreError> {
        let file = RecordFile {
            version: RECORD_FILE_VERSION,
            key: key.as_str().to_string(),
            saved_at: Utc::now(),
            record: value.clone(),
        };
        let serialized = serde_json::to_vec_pretty(&file)?;
        atomic_write(&self.record_path(key), &serialized)
    }

    fn clear(&self, key: RecordKey) -> Result<(), StoreError> {
        match fs::remove_file(self.record_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::Io(err.to_string())),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordFile {
    version: u32,
    key: String,
    saved_at: DateTime<Utc>,
    record: serde_json::Value,
}

fn default_state_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".tokenrelay"))
        .unwrap_or_else(|| PathBuf::from(".tokenrelay"))
}

/// Replace `path` with `data` so readers never observe a half-written record.
///
/// The temp file lives next to the target so the rename stays on one
/// filesystem, and is created `0600` before any bytes land in it.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let Some(file_name) = path.file_name() else {
        return Err(StoreError::Io(format!(
            "record path {} has no file name",
            path.display()
        )));
    };
    let temp_path = dir.join(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        uuid::Uuid::new_v4().simple()
    ));

    let written = write_new_private(&temp_path, data).and_then(|()| fs::rename(&temp_path, path));
    if let Err(err) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

fn write_new_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, FileStateStore) {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(StateStoreConfig::new(dir.path().to_path_buf()));
        (dir, store)
    }

    #[test]
    fn record_round_trip_works() {
        let (_dir, store) = temp_store();
        let value = json!({"access_token": "abc", "expires_at": 1_700_000_000});
        store.save(RecordKey::AppToken, &value).unwrap();
        let loaded = store.load(RecordKey::AppToken).unwrap().unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn missing_record_loads_as_none() {
        let (_dir, store) = temp_store();
        assert!(store.load(RecordKey::UserToken).unwrap().is_none());
    }

    #[test]
    fn clear_removes_record_and_tolerates_absence() {
        let (_dir, store) = temp_store();
        store
            .save(RecordKey::AuthorizationSession, &json!({"state": "n"}))
            .unwrap();
        store.clear(RecordKey::AuthorizationSession).unwrap();
        assert!(store.load(RecordKey::AuthorizationSession).unwrap().is_none());
        store.clear(RecordKey::AuthorizationSession).unwrap();
    }

    #[test]
    fn save_leaves_no_temp_files_behind() {
        let (dir, store) = temp_store();
        store.save(RecordKey::AppToken, &json!({"a": 1})).unwrap();
        store.save(RecordKey::AppToken, &json!({"a": 2})).unwrap();
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["app_access.json".to_string()]);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let (dir, store) = temp_store();
        let raw = json!({
            "version": 7,
            "key": "user_auth",
            "saved_at": "2024-01-01T00:00:00Z",
            "record": {}
        });
        fs::write(dir.path().join("user_auth.json"), raw.to_string()).unwrap();
        let err = store.load(RecordKey::UserToken).unwrap_err();
        assert!(matches!(
            err,
            StoreError::UnsupportedVersion { found: 7, .. }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn saved_records_are_private_to_the_owner() {
        let (dir, store) = temp_store();
        store
            .save(RecordKey::ClientCredentials, &json!({"id": "i", "secret": "s"}))
            .unwrap();
        let mode = fs::metadata(dir.path().join("client.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
