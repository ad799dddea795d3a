//! Storage backends for the calibration engine.
//!
//! - `MemoryKvStore` / `MemoryFileStore`: simulated backends. Clones share
//!   state, and writes can be made to fail, so tests can tamper with one
//!   copy while the engine owns another.
//! - `FsKvStore` / `FsFileStore`: filesystem backends used by the CLI.
pub mod error;
pub mod fs;

pub use error::BackendError;
pub use fs::{FsFileStore, FsKvStore};

use soilcal_traits::{FileStore, KeyValueStore};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// NVS keys are limited to 15 characters on the node.
pub const MAX_KEY_LEN: usize = 15;

pub(crate) fn check_key(key: &str) -> error::Result<()> {
    let ok = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if ok {
        Ok(())
    } else {
        Err(BackendError::InvalidKey(key.to_string()))
    }
}

#[derive(Debug, Default)]
struct KvState {
    namespaces: HashMap<String, HashMap<String, String>>,
    open: Option<String>,
}

/// Simulated key-value store
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    state: Rc<RefCell<KvState>>,
    fail_open: Rc<Cell<bool>>,
    fail_writes: Rc<Cell<bool>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` calls fail.
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.set(fail);
    }

    /// Make `put`/`remove` fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    /// Drop every entry in every namespace, keeping the open namespace open.
    pub fn wipe(&self) {
        let mut st = self.state.borrow_mut();
        for ns in st.namespaces.values_mut() {
            ns.clear();
        }
    }

    /// Raw access for tests: the value under `key` in `namespace`.
    pub fn peek(&self, namespace: &str, key: &str) -> Option<String> {
        self.state
            .borrow()
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.get(key).cloned())
    }

    /// Raw access for tests: store a value without opening the namespace.
    pub fn poke(&self, namespace: &str, key: &str, value: &str) {
        self.state
            .borrow_mut()
            .namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }
}

impl KeyValueStore for MemoryKvStore {
    fn open(&mut self, namespace: &str) -> Result<(), soilcal_traits::BackendError> {
        if self.fail_open.get() {
            return Err(BackendError::Injected("open").into());
        }
        check_key(namespace).map_err(|_| BackendError::InvalidNamespace(namespace.into()))?;
        let mut st = self.state.borrow_mut();
        st.namespaces.entry(namespace.to_string()).or_default();
        st.open = Some(namespace.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, soilcal_traits::BackendError> {
        check_key(key)?;
        let st = self.state.borrow();
        let ns = st.open.as_ref().ok_or(BackendError::NotOpen)?;
        Ok(st.namespaces.get(ns).and_then(|m| m.get(key).cloned()))
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), soilcal_traits::BackendError> {
        check_key(key)?;
        if self.fail_writes.get() {
            return Err(BackendError::Injected("put").into());
        }
        let mut st = self.state.borrow_mut();
        let ns = st.open.clone().ok_or(BackendError::NotOpen)?;
        st.namespaces
            .entry(ns)
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), soilcal_traits::BackendError> {
        check_key(key)?;
        if self.fail_writes.get() {
            return Err(BackendError::Injected("remove").into());
        }
        let mut st = self.state.borrow_mut();
        let ns = st.open.clone().ok_or(BackendError::NotOpen)?;
        if let Some(m) = st.namespaces.get_mut(&ns) {
            m.remove(key);
        }
        Ok(())
    }
}

/// Simulated file store keyed by path
#[derive(Debug, Clone, Default)]
pub struct MemoryFileStore {
    files: Rc<RefCell<HashMap<PathBuf, String>>>,
    fail_writes: Rc<Cell<bool>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    pub fn wipe(&self) {
        self.files.borrow_mut().clear();
    }

    pub fn peek(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files.borrow().get(path.as_ref()).cloned()
    }

    pub fn poke(&self, path: impl AsRef<Path>, contents: &str) {
        self.files
            .borrow_mut()
            .insert(path.as_ref().to_path_buf(), contents.to_string());
    }
}

impl FileStore for MemoryFileStore {
    fn read(&self, path: &Path) -> Result<Option<String>, soilcal_traits::BackendError> {
        Ok(self.files.borrow().get(path).cloned())
    }

    fn write(&mut self, path: &Path, contents: &str) -> Result<(), soilcal_traits::BackendError> {
        if self.fail_writes.get() {
            return Err(BackendError::Injected("write").into());
        }
        self.files
            .borrow_mut()
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn remove(&mut self, path: &Path) -> Result<(), soilcal_traits::BackendError> {
        if self.fail_writes.get() {
            return Err(BackendError::Injected("remove").into());
        }
        self.files.borrow_mut().remove(path);
        Ok(())
    }
}
