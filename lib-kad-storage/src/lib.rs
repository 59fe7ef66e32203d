//! Kad DHT Storage Backends
//!
//! A storage backend holds the (key, value) pairs this node replicates.
//! Two implementations share the [`Storage`] trait: [`MemoryStorage`]
//! evicts by TTL on every access, [`DiskStorage`] flushes each write to a
//! JSON-backed file and never expires entries.

pub mod disk;
pub mod memory;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

/// Storage backend failure.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    /// Disk flush or load failed; logical state is unchanged.
    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted file is not a readable storage snapshot.
    #[error("corrupt storage file: {0}")]
    Corrupt(String),
}

/// Contract shared by the storage backends.
///
/// `get` takes `&mut self` because the TTL variant culls expired entries
/// on every access. Iteration yields pairs in insertion order.
pub trait Storage: Send {
    /// Insert or overwrite, stamping the entry's creation time.
    fn put(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), StorageError>;

    /// Most recent value for `key`, if present and unexpired.
    fn get(&mut self, key: &[u8]) -> Option<Vec<u8>>;

    /// Pairs whose entries were created at least `seconds` ago; the
    /// republish path re-stores these.
    fn items_older_than(&mut self, seconds: u64) -> Vec<(Vec<u8>, Vec<u8>)>;

    /// All live pairs in insertion order.
    fn items(&mut self) -> Vec<(Vec<u8>, Vec<u8>)>;
}
