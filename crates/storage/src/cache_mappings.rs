//! The `cache_mappings.json` sidecar: persists which local cache object
//! backs each logical page, so a restarted cloud provider (or cluster peer)
//! doesn't have to refetch everything from the object store (spec §6).

use crate::error::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One `logical page -> cached object` mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMappingEntry {
    /// `"<wal_id>/<offset>"`, the logical page key.
    pub page: String,
    /// The key of the object holding this page in the local cache dir / store.
    pub object: String,
    /// Size in bytes.
    pub bytes: u64,
}

/// The `cache_mappings.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMappingFile {
    /// Format version; `1` is the only version understood today.
    pub version: u32,
    /// All known mappings.
    pub entries: Vec<CacheMappingEntry>,
}

impl CacheMappingFile {
    /// An empty, current-version mapping file.
    pub fn new() -> Self {
        CacheMappingFile { version: 1, entries: Vec::new() }
    }

    /// Load from `path`, returning an empty file if it doesn't exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let bytes = std::fs::read(path)?;
        let parsed: CacheMappingFile = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::CorruptCacheMapping(e.to_string()))?;
        if parsed.version != 1 {
            return Err(StorageError::CorruptCacheMapping(format!(
                "unsupported cache mapping version {}",
                parsed.version
            )));
        }
        Ok(parsed)
    }

    /// Persist to `path`, overwriting any existing file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| StorageError::CorruptCacheMapping(e.to_string()))?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Look up the cached object key for a logical page.
    pub fn lookup(&self, page: &str) -> Option<&str> {
        self.entries.iter().find(|e| e.page == page).map(|e| e.object.as_str())
    }

    /// Insert or replace the mapping for `page`.
    pub fn upsert(&mut self, page: String, object: String, bytes: u64) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.page == page) {
            existing.object = object;
            existing.bytes = bytes;
        } else {
            self.entries.push(CacheMappingEntry { page, object, bytes });
        }
    }
}

impl Default for CacheMappingFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_through_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache_mappings.json");

        let mut mapping = CacheMappingFile::new();
        mapping.upsert("0/128".into(), "obj-1".into(), 4096);
        mapping.save(&path).unwrap();

        let loaded = CacheMappingFile::load(&path).unwrap();
        assert_eq!(loaded, mapping);
        assert_eq!(loaded.lookup("0/128"), Some("obj-1"));
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let loaded = CacheMappingFile::load(&path).unwrap();
        assert_eq!(loaded, CacheMappingFile::new());
    }
}
