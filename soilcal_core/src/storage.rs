//! Calibration snapshot persistence over two redundant backends.
//!
//! The key-value store holds the primary copy and the file store a replica.
//! Saves are best-effort dual writes: each backend is written independently
//! and a failure on one does not roll back the other.

use std::path::{Path, PathBuf};

use soilcal_traits::{FileStore, KeyValueStore};

use crate::error::{Backend, StorageError};
use crate::model::CalibrationSnapshot;

/// Where the snapshot lives on each backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub namespace: String,
    pub key: String,
    pub snapshot_path: PathBuf,
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            namespace: "calibration".to_string(),
            key: "snapshot".to_string(),
            snapshot_path: PathBuf::from("calibration.json"),
        }
    }
}

/// Per-backend result of one save.
#[derive(Debug)]
pub struct WriteOutcome {
    pub primary: Result<(), String>,
    pub replica: Result<(), String>,
}

impl WriteOutcome {
    pub fn is_complete(&self) -> bool {
        self.primary.is_ok() && self.replica.is_ok()
    }

    /// Collapse into `Ok` only when both backends were written.
    pub fn into_result(self) -> Result<(), StorageError> {
        match (self.primary, self.replica) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(reason)) => Err(StorageError::PartialWrite {
                written: Backend::KeyValue,
                reason,
            }),
            (Err(reason), Ok(())) => Err(StorageError::PartialWrite {
                written: Backend::File,
                reason,
            }),
            (Err(primary), Err(replica)) => Err(StorageError::WriteFailed { primary, replica }),
        }
    }
}

pub struct CalibrationStorage<K, F> {
    kv: K,
    files: F,
    layout: StorageLayout,
    initialized: bool,
}

impl<K: KeyValueStore, F: FileStore> CalibrationStorage<K, F> {
    pub fn new(kv: K, files: F, layout: StorageLayout) -> Self {
        Self {
            kv,
            files,
            layout,
            initialized: false,
        }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Open the key-value namespace. Idempotent.
    pub fn init(&mut self) -> Result<(), StorageError> {
        if self.initialized {
            return Ok(());
        }
        self.kv
            .open(&self.layout.namespace)
            .map_err(|e| StorageError::Open {
                namespace: self.layout.namespace.clone(),
                reason: e.to_string(),
            })?;
        self.initialized = true;
        tracing::debug!(namespace = %self.layout.namespace, "calibration storage ready");
        Ok(())
    }

    fn ensure_init(&self) -> Result<(), StorageError> {
        if self.initialized {
            Ok(())
        } else {
            Err(StorageError::NotInitialized)
        }
    }

    /// Write the snapshot to both backends.
    pub fn save(&mut self, snapshot: &CalibrationSnapshot) -> Result<(), StorageError> {
        self.save_outcome(snapshot)?.into_result()
    }

    /// Like [`save`](Self::save) but reports each backend separately.
    pub fn save_outcome(
        &mut self,
        snapshot: &CalibrationSnapshot,
    ) -> Result<WriteOutcome, StorageError> {
        self.ensure_init()?;
        let json = snapshot
            .to_json()
            .map_err(|e| StorageError::Parse(e.to_string()))?;

        let primary = self
            .kv
            .put(&self.layout.key, &json)
            .map_err(|e| e.to_string());
        let replica = self
            .files
            .write(&self.layout.snapshot_path, &json)
            .map_err(|e| e.to_string());

        let outcome = WriteOutcome { primary, replica };
        if outcome.is_complete() {
            tracing::debug!(bytes = json.len(), "calibration snapshot saved");
        } else {
            tracing::error!(
                primary = ?outcome.primary,
                replica = ?outcome.replica,
                "calibration snapshot save incomplete"
            );
        }
        Ok(outcome)
    }

    /// Load into `snapshot`, primary first, replica as fallback.
    ///
    /// `snapshot` is untouched on error.
    pub fn load(&self, snapshot: &mut CalibrationSnapshot) -> Result<(), StorageError> {
        self.ensure_init()?;
        let text = match self.read_primary() {
            Some(text) => text,
            None => {
                tracing::debug!("primary calibration copy missing, trying file replica");
                self.read_replica()?.ok_or(StorageError::NotFound)?
            }
        };
        snapshot
            .apply_json(&text)
            .map_err(|e| StorageError::Parse(e.to_string()))
    }

    /// Primary copy if present and non-empty; read errors fall through to
    /// the replica.
    fn read_primary(&self) -> Option<String> {
        match self.kv.get(&self.layout.key) {
            Ok(Some(text)) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "key-value read failed");
                None
            }
        }
    }

    fn read_replica(&self) -> Result<Option<String>, StorageError> {
        self.files
            .read(&self.layout.snapshot_path)
            .map(|opt| opt.filter(|t| !t.trim().is_empty()))
            .map_err(|e| StorageError::Read {
                backend: Backend::File,
                reason: e.to_string(),
            })
    }

    /// True if either backend holds a snapshot. The replica needs no
    /// namespace, so it is checked even before `init`.
    pub fn has_data(&self) -> bool {
        (self.initialized && self.kv.contains(&self.layout.key))
            || self.files.exists(&self.layout.snapshot_path)
    }

    /// Remove the snapshot from both backends. Succeeds when nothing exists.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.ensure_init()?;
        let kv = self.kv.remove(&self.layout.key);
        let file = self.files.remove(&self.layout.snapshot_path);
        if let Err(e) = kv {
            return Err(StorageError::Remove {
                backend: Backend::KeyValue,
                reason: e.to_string(),
            });
        }
        if let Err(e) = file {
            return Err(StorageError::Remove {
                backend: Backend::File,
                reason: e.to_string(),
            });
        }
        tracing::info!("calibration storage cleared");
        Ok(())
    }

    /// Write a manual backup to an arbitrary path.
    pub fn export_to_file(
        &mut self,
        path: &Path,
        snapshot: &CalibrationSnapshot,
    ) -> Result<(), StorageError> {
        let json = snapshot
            .to_json()
            .map_err(|e| StorageError::Parse(e.to_string()))?;
        self.files
            .write(path, &json)
            .map_err(|e| StorageError::Write {
                backend: Backend::File,
                reason: e.to_string(),
            })?;
        tracing::info!(path = %path.display(), "calibration exported");
        Ok(())
    }

    /// Read a manual backup from an arbitrary path into `snapshot`.
    pub fn import_from_file(
        &self,
        path: &Path,
        snapshot: &mut CalibrationSnapshot,
    ) -> Result<(), StorageError> {
        let text = self
            .files
            .read(path)
            .map_err(|e| StorageError::Read {
                backend: Backend::File,
                reason: e.to_string(),
            })?
            .ok_or(StorageError::NotFound)?;
        snapshot
            .apply_json(&text)
            .map_err(|e| StorageError::Parse(e.to_string()))
    }
}
