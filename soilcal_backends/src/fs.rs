//! Filesystem-backed stores.
//!
//! Both stores write through a sibling temp file and `rename`, so a crash
//! mid-write leaves either the old or the new contents on disk.

use crate::error::{BackendError, Result};
use crate::check_key;
use soilcal_traits::{FileStore, KeyValueStore};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(contents.as_bytes())?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn remove_optional(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Key-value store laid out as `<root>/<namespace>/<key>.kv`.
#[derive(Debug, Clone)]
pub struct FsKvStore {
    root: PathBuf,
    namespace_dir: Option<PathBuf>,
}

impl FsKvStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            namespace_dir: None,
        }
    }

    fn key_path(&self, key: &str) -> Result<PathBuf> {
        check_key(key)?;
        let dir = self.namespace_dir.as_ref().ok_or(BackendError::NotOpen)?;
        Ok(dir.join(format!("{key}.kv")))
    }
}

impl KeyValueStore for FsKvStore {
    fn open(&mut self, namespace: &str) -> std::result::Result<(), soilcal_traits::BackendError> {
        check_key(namespace).map_err(|_| BackendError::InvalidNamespace(namespace.into()))?;
        let dir = self.root.join(namespace);
        fs::create_dir_all(&dir).map_err(BackendError::from)?;
        tracing::debug!(dir = %dir.display(), "kv namespace open");
        self.namespace_dir = Some(dir);
        Ok(())
    }

    fn get(&self, key: &str) -> std::result::Result<Option<String>, soilcal_traits::BackendError> {
        let path = self.key_path(key)?;
        Ok(read_optional(&path)?)
    }

    fn put(&mut self, key: &str, value: &str) -> std::result::Result<(), soilcal_traits::BackendError> {
        let path = self.key_path(key)?;
        write_atomic(&path, value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> std::result::Result<(), soilcal_traits::BackendError> {
        let path = self.key_path(key)?;
        remove_optional(&path)?;
        Ok(())
    }
}

/// File store; relative paths resolve against `base`.
#[derive(Debug, Clone)]
pub struct FsFileStore {
    base: PathBuf,
}

impl FsFileStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }
}

impl FileStore for FsFileStore {
    fn read(&self, path: &Path) -> std::result::Result<Option<String>, soilcal_traits::BackendError> {
        Ok(read_optional(&self.resolve(path))?)
    }

    fn write(&mut self, path: &Path, contents: &str) -> std::result::Result<(), soilcal_traits::BackendError> {
        let full = self.resolve(path);
        write_atomic(&full, contents)?;
        tracing::debug!(path = %full.display(), bytes = contents.len(), "file written");
        Ok(())
    }

    fn remove(&mut self, path: &Path) -> std::result::Result<(), soilcal_traits::BackendError> {
        remove_optional(&self.resolve(path))?;
        Ok(())
    }
}
