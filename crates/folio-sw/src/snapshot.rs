//! JSON snapshots of cache storage.
//!
//! The in-process storage lives only as long as the process; snapshots let a
//! command-line run pick up the generations a previous run left behind.

use std::path::Path;

use folio_common::{FolioError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{Cache, CacheEntry, MemoryCacheStorage};

/// One generation and its entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSnapshot {
    pub name: String,
    pub entries: Vec<CacheEntry>,
}

/// Every generation in a storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageSnapshot {
    pub generations: Vec<GenerationSnapshot>,
}

impl StorageSnapshot {
    /// Read a snapshot written by [`StorageSnapshot::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let snapshot = serde_json::from_str(&raw).map_err(|e| {
            FolioError::cache_with_source(format!("corrupt snapshot {}", path.display()), e)
        })?;
        debug!(path = %path.display(), "Loaded cache snapshot");
        Ok(snapshot)
    }

    /// Load a snapshot, or start empty when the file does not exist yet.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the snapshot as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| FolioError::cache_with_source("snapshot serialization failed", e))?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), generations = self.generations.len(), "Saved cache snapshot");
        Ok(())
    }

    pub fn generation_names(&self) -> Vec<&str> {
        self.generations.iter().map(|g| g.name.as_str()).collect()
    }
}

impl MemoryCacheStorage {
    /// Capture every generation.
    pub async fn snapshot(&self) -> StorageSnapshot {
        let generations = self
            .caches()
            .await
            .into_iter()
            .map(|cache| {
                let mut entries: Vec<CacheEntry> = cache.entries().cloned().collect();
                entries.sort_by(|a, b| a.key.url.as_str().cmp(b.key.url.as_str()));
                GenerationSnapshot {
                    name: cache.name,
                    entries,
                }
            })
            .collect();
        StorageSnapshot { generations }
    }

    /// Rebuild storage from a snapshot.
    pub fn from_snapshot(snapshot: StorageSnapshot) -> Self {
        Self::with_caches(snapshot.generations.into_iter().map(|generation| {
            let mut cache = Cache::new(&generation.name);
            for entry in generation.entries {
                cache.put(entry);
            }
            cache
        }))
    }
}
