//! `From` implementations bridging `soilcal_config` types to `soilcal_core` types.

use crate::engine::EngineSettings;
use crate::storage::StorageLayout;

// ── EngineSettings ───────────────────────────────────────────────────────────

impl From<&soilcal_config::Config> for EngineSettings {
    fn from(c: &soilcal_config::Config) -> Self {
        Self {
            device_id: c.device.id.clone(),
            outlier_threshold: c.calibration.outlier_threshold,
            max_points: c.calibration.max_points,
        }
    }
}

// ── StorageLayout ────────────────────────────────────────────────────────────

/// The snapshot path stays relative; the file backend resolves it against
/// `storage.root`.
impl From<&soilcal_config::StorageCfg> for StorageLayout {
    fn from(c: &soilcal_config::StorageCfg) -> Self {
        Self {
            namespace: c.namespace.clone(),
            key: c.key.clone(),
            snapshot_path: c.snapshot_file.clone(),
        }
    }
}
