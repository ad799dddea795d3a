pub mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use std::path::Path;

/// Error type shared by all backend seams.
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// Namespaced key-value store (NVS-style). Holds the primary snapshot copy.
pub trait KeyValueStore {
    /// Open (or create) the namespace. Must be called before any other method.
    fn open(&mut self, namespace: &str) -> Result<(), BackendError>;

    /// Read a value. `Ok(None)` when the key does not exist.
    fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    fn put(&mut self, key: &str, value: &str) -> Result<(), BackendError>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), BackendError>;

    fn contains(&self, key: &str) -> bool {
        matches!(self.get(key), Ok(Some(_)))
    }
}

/// Whole-file text store. Holds the replica snapshot copy and manual backups.
pub trait FileStore {
    /// Read a file. `Ok(None)` when the file does not exist.
    fn read(&self, path: &Path) -> Result<Option<String>, BackendError>;

    fn write(&mut self, path: &Path, contents: &str) -> Result<(), BackendError>;

    /// Remove a file. Removing a missing file is not an error.
    fn remove(&mut self, path: &Path) -> Result<(), BackendError>;

    fn exists(&self, path: &Path) -> bool {
        matches!(self.read(path), Ok(Some(_)))
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn open(&mut self, namespace: &str) -> Result<(), BackendError> {
        (**self).open(namespace)
    }
    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        (**self).get(key)
    }
    fn put(&mut self, key: &str, value: &str) -> Result<(), BackendError> {
        (**self).put(key, value)
    }
    fn remove(&mut self, key: &str) -> Result<(), BackendError> {
        (**self).remove(key)
    }
}

impl<T: FileStore + ?Sized> FileStore for Box<T> {
    fn read(&self, path: &Path) -> Result<Option<String>, BackendError> {
        (**self).read(path)
    }
    fn write(&mut self, path: &Path, contents: &str) -> Result<(), BackendError> {
        (**self).write(path, contents)
    }
    fn remove(&mut self, path: &Path) -> Result<(), BackendError> {
        (**self).remove(path)
    }
}
