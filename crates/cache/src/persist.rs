//! Best-effort snapshot persistence
//!
//! A snapshot is one JSON file holding every entry of a cache. It is
//! written to a temporary file and renamed into place. Snapshots are
//! advisory: losing one only means a cold cache.

use std::fs;
use std::hash::Hash;
use std::path::{Path, PathBuf};

use color_picker_memory::Priority;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::IntelligentCache;

/// Version written to new snapshots.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot<K, V> {
    version: u32,
    cache: String,
    entries: Vec<SnapshotEntry<K, V>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry<K, V> {
    key: K,
    value: V,
    size_bytes: u64,
    priority: Priority,
}

impl<K, V> IntelligentCache<K, V>
where
    K: Eq + Hash + Clone + Send + Serialize + DeserializeOwned + 'static,
    V: Clone + Send + Serialize + DeserializeOwned + 'static,
{
    fn snapshot_path(&self) -> Result<&Path, CacheError> {
        self.inner
            .config
            .persistence_path
            .as_deref()
            .ok_or_else(|| CacheError::PersistenceDisabled {
                name: self.inner.name.clone(),
            })
    }

    /// Write all entries to the configured snapshot file.
    ///
    /// Returns the number of entries written.
    pub fn save_snapshot(&self) -> Result<usize, CacheError> {
        let path = self.snapshot_path()?;

        let snapshot = {
            let state = self.inner.state.lock();
            let mut entries: Vec<_> = state.entries.iter().collect();
            // Oldest first, so a reload recreates the same recency order
            entries.sort_by_key(|(_, entry)| entry.touch_seq);
            Snapshot {
                version: SNAPSHOT_VERSION,
                cache: self.inner.name.clone(),
                entries: entries
                    .into_iter()
                    .map(|(key, entry)| SnapshotEntry {
                        key: key.clone(),
                        value: entry.value.clone(),
                        size_bytes: entry.size_bytes,
                        priority: entry.priority,
                    })
                    .collect(),
            }
        };

        let json = serde_json::to_vec(&snapshot)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = temp_path(path);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;

        tracing::debug!(
            cache = %self.inner.name,
            path = %path.display(),
            entries = snapshot.entries.len(),
            "cache snapshot saved"
        );
        Ok(snapshot.entries.len())
    }

    /// Load entries from the configured snapshot file.
    ///
    /// Entries go through the normal insert path, so limits and registry
    /// tracking apply. A missing file loads nothing. Returns the number of
    /// entries read.
    pub fn load_snapshot(&self) -> Result<usize, CacheError> {
        let path = self.snapshot_path()?;

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        let snapshot: Snapshot<K, V> = serde_json::from_slice(&bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CacheError::UnsupportedSnapshot {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        if snapshot.cache != self.inner.name {
            tracing::debug!(
                cache = %self.inner.name,
                snapshot = %snapshot.cache,
                "loading snapshot written by another cache"
            );
        }

        let count = snapshot.entries.len();
        for entry in snapshot.entries {
            self.insert(entry.key, entry.value, entry.priority, entry.size_bytes);
        }

        tracing::debug!(cache = %self.inner.name, entries = count, "cache snapshot loaded");
        Ok(count)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheConfig;
    use color_picker_memory::{ManualSampler, MemoryConfig, ResourceRegistry};
    use std::sync::Arc;

    fn registry() -> Arc<ResourceRegistry> {
        ResourceRegistry::new(MemoryConfig::default(), ManualSampler::failing())
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("palettes.json");
        let config = CacheConfig::default().with_persistence_path(&path);

        let cache: IntelligentCache<String, Vec<u32>> =
            IntelligentCache::new("palettes", config.clone(), registry());
        cache.put_with("warm".to_string(), vec![0xff8800, 0xcc3300], Priority::High, Some(64));
        cache.put_with("cool".to_string(), vec![0x0088ff], Priority::Normal, Some(32));

        assert_eq!(cache.save_snapshot().unwrap(), 2);
        assert!(path.exists());

        let registry = registry();
        let restored: IntelligentCache<String, Vec<u32>> =
            IntelligentCache::new("palettes", config, registry.clone());
        assert_eq!(restored.load_snapshot().unwrap(), 2);

        assert_eq!(restored.get("warm"), Some(vec![0xff8800, 0xcc3300]));
        assert_eq!(restored.size_bytes(), 96);
        assert_eq!(registry.current_size(), 96);
        assert_eq!(
            registry
                .resource(&format!("{}:0", restored.inner.id_prefix))
                .map(|info| info.priority),
            Some(Priority::High)
        );
    }

    #[test]
    fn test_missing_snapshot_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig::default().with_persistence_path(dir.path().join("none.json"));
        let cache: IntelligentCache<u32, u32> = IntelligentCache::new("empty", config, registry());

        assert_eq!(cache.load_snapshot().unwrap(), 0);
    }

    #[test]
    fn test_persistence_disabled() {
        let cache: IntelligentCache<u32, u32> =
            IntelligentCache::new("memory-only", CacheConfig::default(), registry());

        assert!(matches!(
            cache.save_snapshot(),
            Err(CacheError::PersistenceDisabled { .. })
        ));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.json");
        fs::write(&path, r#"{"version": 99, "cache": "future", "entries": []}"#).unwrap();

        let config = CacheConfig::default().with_persistence_path(&path);
        let cache: IntelligentCache<u32, u32> = IntelligentCache::new("future", config, registry());

        assert!(matches!(
            cache.load_snapshot(),
            Err(CacheError::UnsupportedSnapshot { found: 99, expected: 1 })
        ));
    }

    #[test]
    fn test_clear_deletes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cleared.json");
        let config = CacheConfig::default().with_persistence_path(&path);
        let cache: IntelligentCache<u32, u32> = IntelligentCache::new("cleared", config, registry());

        cache.put(1, 1);
        cache.save_snapshot().unwrap();
        assert!(path.exists());

        cache.clear();
        assert!(!path.exists());
    }
}
