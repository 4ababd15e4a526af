//! Manifest (C10): persists the Merkle tree and index statistics between
//! runs so indexing can diff against the previous state instead of always
//! rebuilding from nothing.

use crate::error::{CoreError, CoreResult};
use crate::scan::Node;
use serde::{Deserialize, Serialize};
use std::path::Path;

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestStats {
    pub total_files: u64,
    pub total_chunks: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub tree: Option<Node>,
    #[serde(default)]
    pub stats: ManifestStats,
}

impl Manifest {
    pub fn new() -> Self {
        let now = chrono::Utc::now();
        Manifest {
            version: 1,
            created_at: now,
            updated_at: now,
            tree: None,
            stats: ManifestStats::default(),
        }
    }

    fn path(state_dir: &Path) -> std::path::PathBuf {
        state_dir.join(MANIFEST_FILE)
    }

    /// Returns `None` if no manifest has ever been written.
    pub fn load(state_dir: &Path) -> CoreResult<Option<Self>> {
        let path = Self::path(state_dir);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)
            .map_err(|e| CoreError::StoreError(format!("reading {}: {e}", path.display())))?;
        let manifest = serde_json::from_str(&data)
            .map_err(|e| CoreError::StoreError(format!("parsing {}: {e}", path.display())))?;
        Ok(Some(manifest))
    }

    pub fn save(&mut self, state_dir: &Path) -> CoreResult<()> {
        self.updated_at = chrono::Utc::now();
        std::fs::create_dir_all(state_dir)
            .map_err(|e| CoreError::StoreError(format!("creating {}: {e}", state_dir.display())))?;
        let path = Self::path(state_dir);
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::StoreError(e.to_string()))?;
        std::fs::write(&path, data)
            .map_err(|e| CoreError::StoreError(format!("writing {}: {e}", path.display())))
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_manifest_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Manifest::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = Manifest::new();
        manifest.stats.total_files = 3;
        manifest.stats.total_chunks = 9;
        manifest.save(dir.path()).unwrap();

        let loaded = Manifest::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.stats.total_files, 3);
        assert_eq!(loaded.stats.total_chunks, 9);
        assert!(loaded.tree.is_none());
    }

    #[test]
    fn save_updates_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = Manifest::new();
        let created = manifest.created_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        manifest.save(dir.path()).unwrap();
        assert_eq!(manifest.created_at, created);
        assert!(manifest.updated_at >= created);
    }
}
