//! In-memory TTL-evicting storage
//!
//! Entries are kept in insertion order, which is also ascending creation
//! order, so expiry scans stop at the first fresh entry. Every access
//! culls before it answers.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::{Storage, StorageError};

/// Default entry lifetime: one week.
pub const DEFAULT_TTL: Duration = Duration::from_secs(604_800);

struct Entry {
    key: Vec<u8>,
    created_at: Instant,
    value: Vec<u8>,
}

/// Bounded-lifetime storage backing a running node.
pub struct MemoryStorage {
    entries: Vec<Entry>,
    ttl: Duration,
}

impl MemoryStorage {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: Vec::new(), ttl }
    }

    /// Drop expired entries, oldest first, popping by key.
    fn cull(&mut self) {
        let expired: Vec<Vec<u8>> = self
            .entries
            .iter()
            .take_while(|entry| entry.created_at.elapsed() >= self.ttl)
            .map(|entry| entry.key.clone())
            .collect();
        for key in expired {
            debug!(key = %hex::encode(&key), "culling expired entry");
            self.entries.retain(|entry| entry.key != key);
        }
    }

    fn position(&self, key: &[u8]) -> Option<usize> {
        self.entries.iter().position(|entry| entry.key == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl Storage for MemoryStorage {
    fn put(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), StorageError> {
        if let Some(index) = self.position(key) {
            self.entries.remove(index);
        }
        self.entries.push(Entry {
            key: key.to_vec(),
            created_at: Instant::now(),
            value,
        });
        self.cull();
        Ok(())
    }

    fn get(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.cull();
        let index = self.position(key)?;
        Some(self.entries[index].value.clone())
    }

    fn items_older_than(&mut self, seconds: u64) -> Vec<(Vec<u8>, Vec<u8>)> {
        let min_age = Duration::from_secs(seconds);
        self.entries
            .iter()
            .take_while(|entry| entry.created_at.elapsed() >= min_age)
            .map(|entry| (entry.key.clone(), entry.value.clone()))
            .collect()
    }

    fn items(&mut self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.cull();
        self.entries
            .iter()
            .map(|entry| (entry.key.clone(), entry.value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_then_get() {
        let mut storage = MemoryStorage::default();
        storage.put(b"key1", b"value1".to_vec()).unwrap();
        assert_eq!(storage.get(b"key1"), Some(b"value1".to_vec()));
        assert_eq!(storage.get(b"key2"), None);
    }

    #[test]
    fn test_overwrite_is_idempotent() {
        let mut storage = MemoryStorage::default();
        storage.put(b"key1", b"value1".to_vec()).unwrap();
        storage.put(b"key1", b"value1".to_vec()).unwrap();
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get(b"key1"), Some(b"value1".to_vec()));
    }

    #[test]
    fn test_overwrite_moves_entry_to_tail() {
        let mut storage = MemoryStorage::default();
        storage.put(b"key1", b"value1".to_vec()).unwrap();
        storage.put(b"key2", b"value2".to_vec()).unwrap();
        storage.put(b"key1", b"value3".to_vec()).unwrap();

        let items = storage.items();
        assert_eq!(items[0].0, b"key2");
        assert_eq!(items[1], (b"key1".to_vec(), b"value3".to_vec()));
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let mut storage = MemoryStorage::new(Duration::from_secs(0));
        storage.put(b"key1", b"value1".to_vec()).unwrap();
        assert_eq!(storage.get(b"key1"), None);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_fresh_entries_survive_cull() {
        let mut storage = MemoryStorage::new(Duration::from_secs(3600));
        storage.put(b"key1", b"value1".to_vec()).unwrap();
        storage.put(b"key2", b"value2".to_vec()).unwrap();
        assert_eq!(storage.items().len(), 2);
    }

    #[test]
    fn test_items_older_than_zero_returns_everything() {
        let mut storage = MemoryStorage::default();
        storage.put(b"key1", b"value1".to_vec()).unwrap();
        storage.put(b"key2", b"value2".to_vec()).unwrap();
        assert_eq!(storage.items_older_than(0).len(), 2);
    }

    #[test]
    fn test_items_older_than_huge_age_returns_nothing() {
        let mut storage = MemoryStorage::default();
        storage.put(b"key1", b"value1".to_vec()).unwrap();
        assert!(storage.items_older_than(3600).is_empty());
    }
}
