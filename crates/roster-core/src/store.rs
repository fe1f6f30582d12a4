//! String key-value stores
//!
//! Two scopes are used by the client:
//! - a tab-scoped store that survives reloads but not tab close
//!   (live agent snapshot)
//! - a durable store that survives restarts (last activity, remembered
//!   identity, last login id, notification preferences)
//!
//! Both share the `KeyValueStore` contract; which scope a store plays is
//! decided by whoever wires it.

use crate::error::StoreError;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Well-known keys
pub mod keys {
    /// Tab scope: serialized agent of the live session
    pub const SESSION_AGENT: &str = "roster_session";
    /// Durable: epoch ms of the last qualifying activity
    pub const LAST_ACTIVE: &str = "last_active_time";
    /// Durable: quick-login reference
    pub const REMEMBERED_IDENTITY: &str = "remembered_user";
    /// Durable: identifier used for the last successful login
    pub const LAST_LOGIN_ID: &str = "last_login_id";
    /// Durable: installed client version marker
    pub const APP_VERSION: &str = "app_version";
    /// Durable: install banner dismissed
    pub const PWA_DISMISSED: &str = "pwa_banner_dismissed";
    /// Durable: epoch ms when connectivity was first seen lost
    pub const OFFLINE_START: &str = "offline_start_time";
    /// Durable prefix: read notification ids for an agent
    pub const READ_PREFIX: &str = "read_notifications_";
    /// Durable prefix: deleted notification ids for an agent
    pub const DELETED_PREFIX: &str = "deleted_notifications_";

    /// Read-set key for an agent
    #[must_use]
    pub fn read_notifications(agent_id: &str) -> String {
        format!("{READ_PREFIX}{agent_id}")
    }

    /// Deleted-set key for an agent
    #[must_use]
    pub fn deleted_notifications(agent_id: &str) -> String {
        format!("{DELETED_PREFIX}{agent_id}")
    }

    /// Per-agent notification preference entry
    #[must_use]
    pub fn is_notification_key(key: &str) -> bool {
        key.starts_with(READ_PREFIX) || key.starts_with(DELETED_PREFIX)
    }
}

/// get/set/remove/clear by string key
pub trait KeyValueStore: Send + Sync + Debug {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete a value
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Delete everything
    fn clear(&self) -> Result<(), StoreError>;

    /// All keys currently present
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// JSON helpers over any store
pub trait KeyValueStoreExt: KeyValueStore {
    /// Read and decode. Undecodable values are removed and read as absent.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                tracing::warn!(key, error = %err, "discarding undecodable stored value");
                self.remove(key)?;
                Ok(None)
            }
        }
    }

    /// Encode and write
    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw)
    }

    /// Read an epoch-ms timestamp; malformed values read as absent
    fn get_millis(&self, key: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.get(key)?.and_then(|raw| raw.trim().parse().ok()))
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// No entries
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.entries.lock().clear();
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.lock().keys().cloned().collect())
    }
}

/// Durable store backed by a JSON file.
///
/// The whole map is rewritten on each mutation through a temporary file
/// and a rename, so a crash leaves either the old or the new content.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or create) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        tracing::debug!(path = %path.display(), entries = entries.len(), "opened file store");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Backing file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(serde_json::to_string_pretty(entries)?.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        entries.clear();
        self.persist(&entries)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.lock().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        store.remove("a").unwrap();
        assert!(store.get("a").unwrap().is_none());
    }

    #[test]
    fn undecodable_json_reads_as_absent() {
        let store = MemoryStore::new();
        store.set(keys::REMEMBERED_IDENTITY, "{not json").unwrap();
        let value: Option<serde_json::Value> = store.get_json(keys::REMEMBERED_IDENTITY).unwrap();
        assert!(value.is_none());
        assert!(store.get(keys::REMEMBERED_IDENTITY).unwrap().is_none());
    }

    #[test]
    fn millis_parse_leniently() {
        let store = MemoryStore::new();
        store.set(keys::LAST_ACTIVE, "12345").unwrap();
        assert_eq!(store.get_millis(keys::LAST_ACTIVE).unwrap(), Some(12_345));
        store.set(keys::LAST_ACTIVE, "later").unwrap();
        assert_eq!(store.get_millis(keys::LAST_ACTIVE).unwrap(), None);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("durable.json");
        {
            let store = FileStore::open(&path).unwrap();
            store.set(keys::LAST_LOGIN_ID, "V-1234").unwrap();
            store.set(keys::APP_VERSION, "1.7.4").unwrap();
            store.remove(keys::APP_VERSION).unwrap();
        }
        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get(keys::LAST_LOGIN_ID).unwrap().as_deref(), Some("V-1234"));
        assert_eq!(store.keys().unwrap(), vec![keys::LAST_LOGIN_ID.to_string()]);
    }

    #[test]
    fn notification_keys_are_recognised() {
        assert!(keys::is_notification_key(&keys::read_notifications("V-1")));
        assert!(keys::is_notification_key(&keys::deleted_notifications("V-1")));
        assert!(!keys::is_notification_key(keys::LAST_ACTIVE));
    }
}
