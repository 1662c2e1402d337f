//! Named cache collection
//!
//! The manager only indexes caches by name and fans operations out to them;
//! all eviction logic lives in the caches themselves.

use std::any::Any;
use std::collections::BTreeMap;
use std::hash::Hash;
use std::sync::Arc;

use color_picker_memory::ResourceRegistry;
use parking_lot::RwLock;
use serde::Serialize;

use crate::cache::{CacheStats, IntelligentCache};
use crate::config::CacheConfig;
use crate::error::CacheError;

/// Type-erased view of an [`IntelligentCache`].
pub trait ManagedCache: Send + Sync {
    /// Cache name
    fn name(&self) -> &str;

    /// Current statistics
    fn stats(&self) -> CacheStats;

    /// Evict `target_bytes`, or a quarter of the cache when `None`
    fn cleanup(&self, target_bytes: Option<u64>) -> u64;

    /// Remove every entry
    fn clear(&self);

    /// Concrete cache, for typed lookups
    fn as_any(&self) -> &dyn Any;
}

impl<K, V> ManagedCache for IntelligentCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        IntelligentCache::name(self)
    }

    fn stats(&self) -> CacheStats {
        IntelligentCache::stats(self)
    }

    fn cleanup(&self, target_bytes: Option<u64>) -> u64 {
        IntelligentCache::cleanup(self, target_bytes)
    }

    fn clear(&self) {
        IntelligentCache::clear(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Aggregated statistics across all managed caches
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AggregatedCacheStats {
    /// Number of caches
    pub caches: usize,
    /// Entries across all caches
    pub entries: usize,
    /// Bytes across all caches
    pub size_bytes: u64,
    /// Sum of the caches' size limits
    pub max_size_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl AggregatedCacheStats {
    fn add(&mut self, stats: &CacheStats) {
        self.caches += 1;
        self.entries += stats.entries;
        self.size_bytes += stats.size_bytes;
        self.max_size_bytes += stats.max_size_bytes;
        self.hits += stats.hits;
        self.misses += stats.misses;
        self.evictions += stats.evictions;
    }

    /// Get overall utilization (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.max_size_bytes == 0 {
            0.0
        } else {
            self.size_bytes as f64 / self.max_size_bytes as f64
        }
    }

    /// Get overall hit rate, weighted by request count
    pub fn overall_hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Collection of named caches sharing one registry.
///
/// # Example
///
/// ```
/// use color_picker_cache::{CacheConfig, CacheManager};
/// use color_picker_memory::{ManualSampler, MemoryConfig, ResourceRegistry};
///
/// let registry = ResourceRegistry::new(MemoryConfig::default(), ManualSampler::failing());
/// let manager = CacheManager::new(registry);
///
/// let colors = manager.create::<String, u32>("colors", CacheConfig::new(1, 256)).unwrap();
/// colors.put("accent".to_string(), 0xff8800);
///
/// let same = manager.get::<String, u32>("colors").unwrap().expect("created above");
/// assert_eq!(same.get("accent"), Some(0xff8800));
/// println!("Hit rate: {:.1}%", manager.aggregate_stats().overall_hit_rate() * 100.0);
/// ```
pub struct CacheManager {
    registry: Arc<ResourceRegistry>,
    caches: RwLock<BTreeMap<String, Arc<dyn ManagedCache>>>,
}

impl CacheManager {
    /// Create an empty manager whose caches report to `registry`.
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self {
            registry,
            caches: RwLock::new(BTreeMap::new()),
        }
    }

    /// Get the shared registry
    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    /// Create a cache, or return the existing one with the same name.
    ///
    /// An existing cache keeps its original configuration. Fails with
    /// [`CacheError::TypeMismatch`] if it was created with other types.
    pub fn create<K, V>(
        &self,
        name: &str,
        config: CacheConfig,
    ) -> Result<IntelligentCache<K, V>, CacheError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        let mut caches = self.caches.write();
        if let Some(existing) = caches.get(name) {
            return downcast(name, &**existing);
        }

        let cache = IntelligentCache::new(name, config, self.registry.clone());
        caches.insert(name.to_string(), Arc::new(cache.clone()));
        tracing::debug!(cache = name, "cache registered with manager");
        Ok(cache)
    }

    /// Get an existing cache by name.
    ///
    /// Returns `Ok(None)` if no cache has that name.
    pub fn get<K, V>(&self, name: &str) -> Result<Option<IntelligentCache<K, V>>, CacheError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        let caches = self.caches.read();
        caches
            .get(name)
            .map(|cache| downcast(name, &**cache))
            .transpose()
    }

    /// Clear and drop a cache. Returns whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.caches.write().remove(name);
        match removed {
            Some(cache) => {
                cache.clear();
                true
            }
            None => false,
        }
    }

    /// Names of all caches, sorted
    pub fn names(&self) -> Vec<String> {
        self.caches.read().keys().cloned().collect()
    }

    /// Number of caches
    pub fn len(&self) -> usize {
        self.caches.read().len()
    }

    /// Returns true if no caches exist
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn ManagedCache>> {
        self.caches.read().values().cloned().collect()
    }

    /// Statistics of every cache, by name
    pub fn get_all_stats(&self) -> BTreeMap<String, CacheStats> {
        self.snapshot()
            .into_iter()
            .map(|cache| (cache.name().to_string(), cache.stats()))
            .collect()
    }

    /// Statistics summed over all caches
    pub fn aggregate_stats(&self) -> AggregatedCacheStats {
        let mut aggregated = AggregatedCacheStats::default();
        for cache in self.snapshot() {
            aggregated.add(&cache.stats());
        }
        aggregated
    }

    /// Run the default cleanup on every cache. Returns the bytes freed.
    pub fn cleanup_all(&self) -> u64 {
        let freed: u64 = self
            .snapshot()
            .into_iter()
            .map(|cache| cache.cleanup(None))
            .sum();
        tracing::debug!(freed, "cleaned up all caches");
        freed
    }

    /// Clear every cache; the caches stay registered.
    pub fn clear_all(&self) {
        for cache in self.snapshot() {
            cache.clear();
        }
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("caches", &self.names())
            .finish()
    }
}

fn downcast<K, V>(name: &str, cache: &dyn ManagedCache) -> Result<IntelligentCache<K, V>, CacheError>
where
    K: 'static,
    V: 'static,
{
    cache
        .as_any()
        .downcast_ref::<IntelligentCache<K, V>>()
        .cloned()
        .ok_or_else(|| CacheError::TypeMismatch {
            name: name.to_string(),
        })
}
