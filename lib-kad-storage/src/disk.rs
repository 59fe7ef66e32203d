//! Persistent on-disk storage
//!
//! A JSON map of hex-encoded key to (created_at, value) pairs, rewritten
//! in full on every put. Creation times are wall-clock seconds so the
//! snapshot survives restarts. No TTL eviction; a requested TTL is
//! accepted but ignored with a warning.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Storage, StorageError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiskEntry {
    created_at: u64,
    value: Vec<u8>,
}

/// File-backed storage keyed by hex-encoded key bytes.
pub struct DiskStorage {
    path: PathBuf,
    // BTreeMap keeps the file diff-stable; insertion order is recovered
    // from created_at when iterating.
    data: BTreeMap<String, DiskEntry>,
}

impl DiskStorage {
    /// Open or create the storage file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)
                    .map_err(|e| StorageError::Corrupt(e.to_string()))?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, data })
    }

    /// Open with a TTL request, which this backend does not honor.
    pub fn open_with_ttl(
        path: impl AsRef<Path>,
        ttl: Duration,
    ) -> Result<Self, StorageError> {
        warn!(
            ttl_secs = ttl.as_secs(),
            "disk storage does not expire entries; ttl ignored"
        );
        Self::open(path)
    }

    fn flush(&self) -> Result<(), StorageError> {
        let serialized = serde_json::to_string(&self.data)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let mut file = std::fs::File::create(&self.path)?;
        file.write_all(serialized.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    /// Pairs ordered by ascending creation time.
    fn ordered(&self) -> Vec<(Vec<u8>, &DiskEntry)> {
        let mut entries: Vec<_> = self
            .data
            .iter()
            .filter_map(|(hex_key, entry)| {
                hex::decode(hex_key).ok().map(|key| (key, entry))
            })
            .collect();
        entries.sort_by_key(|(_, entry)| entry.created_at);
        entries
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Storage for DiskStorage {
    fn put(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), StorageError> {
        self.data.insert(
            hex::encode(key),
            DiskEntry { created_at: Self::now_secs(), value },
        );
        self.flush()
    }

    fn get(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.get(&hex::encode(key)).map(|entry| entry.value.clone())
    }

    fn items_older_than(&mut self, seconds: u64) -> Vec<(Vec<u8>, Vec<u8>)> {
        let min_birthday = Self::now_secs().saturating_sub(seconds);
        self.ordered()
            .into_iter()
            .take_while(|(_, entry)| entry.created_at <= min_birthday)
            .map(|(key, entry)| (key, entry.value.clone()))
            .collect()
    }

    fn items(&mut self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.ordered()
            .into_iter()
            .map(|(key, entry)| (key, entry.value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, DiskStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::open(dir.path().join("data.db")).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_put_then_get() {
        let (_dir, mut storage) = temp_store();
        storage.put(b"key1", b"value1".to_vec()).unwrap();
        assert_eq!(storage.get(b"key1"), Some(b"value1".to_vec()));
        assert_eq!(storage.get(b"missing"), None);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");
        {
            let mut storage = DiskStorage::open(&path).unwrap();
            storage.put(b"key1", b"value1".to_vec()).unwrap();
        }
        let mut reopened = DiskStorage::open(&path).unwrap();
        assert_eq!(reopened.get(b"key1"), Some(b"value1".to_vec()));
    }

    #[test]
    fn test_keys_are_hex_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");
        let mut storage = DiskStorage::open(&path).unwrap();
        storage.put(&[0x91, 0xec, 0xb5], b"value1".to_vec()).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("91ecb5"));
    }

    #[test]
    fn test_overwrite_keeps_single_entry() {
        let (_dir, mut storage) = temp_store();
        storage.put(b"key1", b"old".to_vec()).unwrap();
        storage.put(b"key1", b"new".to_vec()).unwrap();
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get(b"key1"), Some(b"new".to_vec()));
    }

    #[test]
    fn test_ttl_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage =
            DiskStorage::open_with_ttl(dir.path().join("data.db"), Duration::from_secs(0))
                .unwrap();
        storage.put(b"key1", b"value1".to_vec()).unwrap();
        // A zero TTL would have evicted this in the memory backend.
        assert_eq!(storage.get(b"key1"), Some(b"value1".to_vec()));
    }

    #[test]
    fn test_items_older_than_zero_returns_everything() {
        let (_dir, mut storage) = temp_store();
        storage.put(b"key1", b"value1".to_vec()).unwrap();
        storage.put(b"key2", b"value2".to_vec()).unwrap();
        assert_eq!(storage.items_older_than(0).len(), 2);
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            DiskStorage::open(&path),
            Err(StorageError::Corrupt(_))
        ));
    }
}
