//! Intelligent cache with policy-driven eviction
//!
//! Each entry is mirrored in the [`ResourceRegistry`] so process-wide
//! cleanup can reclaim it. The cache owns its values; the registry holds
//! only size and recency metadata plus a cleanup action that removes the
//! entry here.
//!
//! Locks are always taken cache first, registry second.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use color_picker_memory::{
    fraction_of, MemoryObserver, MemoryStats, OwnerToken, PressureLevel, Priority, Registration,
    ResourceRegistry,
};
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::CacheConfig;
use crate::entry::CacheEntry;
use crate::policy::{EntryStats, EvictionPolicy};
use crate::size::{estimate_size, EstimateSize};

/// Fraction of the cache freed by a manual cleanup without a target.
const DEFAULT_CLEANUP_FRACTION: f64 = 0.25;

/// Process-wide counter keeping registry ids of same-name caches apart.
static NEXT_CACHE_INSTANCE: AtomicU64 = AtomicU64::new(0);

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of entries currently in cache
    pub entries: usize,

    /// Total estimated size of cached values (bytes)
    pub size_bytes: u64,

    /// Maximum size allowed (bytes)
    pub max_size_bytes: u64,

    /// Number of cache hits
    pub hits: u64,

    /// Number of cache misses
    pub misses: u64,

    /// Number of entries evicted by capacity limits, cleanup or memory pressure
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate size utilization (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.max_size_bytes == 0 {
            0.0
        } else {
            self.size_bytes as f64 / self.max_size_bytes as f64
        }
    }
}

/// Internal cache state
pub(crate) struct CacheState<K, V> {
    pub(crate) entries: HashMap<K, CacheEntry<V>>,
    /// Sum of entry sizes in bytes
    pub(crate) size_bytes: u64,
    next_generation: u64,
    next_touch: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<K, V> CacheState<K, V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            size_bytes: 0,
            next_generation: 0,
            next_touch: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    fn bump_touch(&mut self) -> u64 {
        let seq = self.next_touch;
        self.next_touch += 1;
        seq
    }
}

/// Shared part of a cache; every handle points to one of these.
pub(crate) struct CacheInner<K, V> {
    pub(crate) name: String,
    /// `"{name}#{instance}"`; entries register as `"{id_prefix}:{generation}"`
    pub(crate) id_prefix: String,
    pub(crate) config: CacheConfig,
    policy: Box<dyn EvictionPolicy>,
    pub(crate) registry: Arc<ResourceRegistry>,
    pub(crate) state: Mutex<CacheState<K, V>>,
}

impl<K, V> CacheInner<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + 'static,
{
    /// Evict entries to free `target_bytes` and at least `min_entries`.
    ///
    /// With `enforce_limits`, entries the policy protects are taken as well
    /// when the policy alone cannot meet the request. Returns bytes freed.
    fn evict(
        &self,
        state: &mut CacheState<K, V>,
        target_bytes: u64,
        min_entries: usize,
        enforce_limits: bool,
        now: Instant,
    ) -> u64 {
        if state.entries.is_empty() || (target_bytes == 0 && min_entries == 0) {
            return 0;
        }

        let (keys, stats): (Vec<K>, Vec<EntryStats>) = state
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.stats()))
            .unzip();

        let mut victims = self.policy.select_victims(&stats, target_bytes, now);
        let mut freed: u64 = victims.iter().map(|&i| stats[i].size_bytes).sum();

        if enforce_limits && (freed < target_bytes || victims.len() < min_entries) {
            let mut chosen = vec![false; stats.len()];
            for &i in &victims {
                chosen[i] = true;
            }
            let mut fallback = self.policy.rank(&stats, now);
            fallback.sort_by_key(|&i| stats[i].priority.is_critical());

            for i in fallback {
                if freed >= target_bytes && victims.len() >= min_entries {
                    break;
                }
                if !chosen[i] {
                    victims.push(i);
                    freed += stats[i].size_bytes;
                }
            }
        }

        let mut evicted = 0usize;
        for i in victims {
            if let Some(entry) = state.entries.remove(&keys[i]) {
                state.size_bytes -= entry.size_bytes;
                state.evictions += 1;
                evicted += 1;
                self.registry.unregister(&entry.registry_id);
            }
        }

        tracing::debug!(
            cache = %self.name,
            policy = self.policy.name(),
            target_bytes,
            freed,
            evicted,
            "cache eviction"
        );
        freed
    }

    /// Make room for an entry of `incoming` bytes.
    fn ensure_capacity(&self, state: &mut CacheState<K, V>, incoming: u64, now: Instant) {
        let max_entries = self.config.max_entries;
        if state.entries.len() >= max_entries {
            let excess = state.entries.len() + 1 - max_entries;
            self.evict(state, 0, excess, true, now);
        }

        let projected = state.size_bytes + incoming;
        if projected > self.config.max_size_bytes {
            self.evict(state, projected - self.config.max_size_bytes, 0, true, now);
        }
    }

    /// Drop the entry for `key` if it is still the given generation.
    ///
    /// Run by the registry after it has already removed the descriptor.
    fn evict_generation(&self, key: &K, generation: u64) {
        let mut state = self.state.lock();
        if state.entries.get(key).map(|entry| entry.generation) != Some(generation) {
            return;
        }
        if let Some(entry) = state.entries.remove(key) {
            state.size_bytes -= entry.size_bytes;
            state.evictions += 1;
            tracing::debug!(cache = %self.name, id = %entry.registry_id, "entry evicted by registry");
        }
    }

    /// Free a pressure-dependent share of the cache.
    fn shrink_for_pressure(&self, pressure: f64) -> u64 {
        let mut state = self.state.lock();
        let level = PressureLevel::from_pressure(pressure);
        let target = fraction_of(state.size_bytes, level.reduction_fraction());
        if target == 0 {
            return 0;
        }

        tracing::debug!(cache = %self.name, ?level, target, "shrinking cache on memory warning");
        self.evict(&mut state, target, 0, false, Instant::now())
    }
}

/// Subscribes a cache to registry memory warnings without keeping it alive.
struct PressureObserver<K, V> {
    cache: Weak<CacheInner<K, V>>,
}

impl<K, V> MemoryObserver for PressureObserver<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + 'static,
{
    fn on_memory_warning(&self, stats: &MemoryStats) {
        if let Some(cache) = self.cache.upgrade() {
            cache.shrink_for_pressure(stats.pressure());
        }
    }

    fn is_active(&self) -> bool {
        self.cache.strong_count() > 0
    }
}

/// Thread-safe cache with size and entry limits and pluggable eviction.
///
/// Handles are cheap to clone and share one cache.
///
/// # Example
///
/// ```
/// use color_picker_cache::{CacheConfig, IntelligentCache};
/// use color_picker_memory::{ManualSampler, MemoryConfig, Priority, ResourceRegistry};
///
/// let registry = ResourceRegistry::new(MemoryConfig::default(), ManualSampler::failing());
/// let cache: IntelligentCache<String, Vec<u8>> =
///     IntelligentCache::new("thumbnails", CacheConfig::new(16, 100), registry.clone());
///
/// cache.put_with("sunset.png".to_string(), vec![0u8; 4096], Priority::High, Some(4096));
/// assert_eq!(cache.get("sunset.png").map(|v| v.len()), Some(4096));
/// assert_eq!(registry.current_size(), 4096);
///
/// let stats = cache.stats();
/// println!("Hit rate: {:.2}%", stats.hit_rate() * 100.0);
/// ```
pub struct IntelligentCache<K, V> {
    pub(crate) inner: Arc<CacheInner<K, V>>,
}

impl<K, V> Clone for IntelligentCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> IntelligentCache<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + 'static,
{
    /// Create a cache and subscribe it to the registry's memory warnings.
    ///
    /// # Arguments
    ///
    /// * `name` - Cache name, used as the prefix of registry ids. Caches
    ///   sharing a name still get distinct ids.
    /// * `config` - Limits, resource kind and eviction policy
    /// * `registry` - Registry that tracks the cache's entries
    pub fn new(name: impl Into<String>, config: CacheConfig, registry: Arc<ResourceRegistry>) -> Self {
        let name = name.into();
        let policy = config.eviction_policy.build(config.adaptive_weights);
        tracing::debug!(
            cache = %name,
            policy = policy.name(),
            max_size_bytes = config.max_size_bytes,
            max_entries = config.max_entries,
            "cache created"
        );

        let instance = NEXT_CACHE_INSTANCE.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::new(CacheInner {
            id_prefix: format!("{}#{}", name, instance),
            name,
            config,
            policy,
            registry,
            state: Mutex::new(CacheState::new()),
        });
        inner.registry.add_observer(Arc::new(PressureObserver {
            cache: Arc::downgrade(&inner),
        }));

        Self { inner }
    }

    /// Get the cache name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Get the configuration
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Get the registry the cache reports to
    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.inner.registry
    }

    /// Retrieve a value from the cache
    ///
    /// A hit updates the entry's recency and access count, both here and in
    /// the registry. A miss only counts the miss.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let now = Instant::now();
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let seq = state.bump_touch();

        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.touch(now, seq);
                self.inner.registry.access(&entry.registry_id);
                tracing::trace!(cache = %self.inner.name, id = %entry.registry_id, "cache hit");
                let value = entry.value.clone();
                state.hits += 1;
                Some(value)
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    /// Retrieve a value, or `default` on a miss.
    pub fn get_or<Q>(&self, key: &Q, default: V) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.get(key).unwrap_or(default)
    }

    /// Store a value with normal priority and an estimated size.
    pub fn put(&self, key: K, value: V)
    where
        V: EstimateSize,
    {
        self.put_with(key, value, Priority::Normal, None);
    }

    /// Store a value
    ///
    /// If storing the value would exceed the entry or size limit, entries
    /// are evicted in policy order first. A value larger than the whole
    /// cache is dropped and counted as an eviction.
    ///
    /// # Arguments
    ///
    /// * `key` - Cache key
    /// * `value` - Value to cache
    /// * `priority` - Retention priority
    /// * `size_hint` - Size in bytes; estimated from the value when `None`
    pub fn put_with(&self, key: K, value: V, priority: Priority, size_hint: Option<u64>)
    where
        V: EstimateSize,
    {
        let size_bytes = size_hint.unwrap_or_else(|| estimate_size(&value));
        self.insert(key, value, priority, size_bytes);
    }

    pub(crate) fn insert(&self, key: K, value: V, priority: Priority, size_bytes: u64) {
        let inner = &self.inner;
        let now = Instant::now();
        let mut guard = inner.state.lock();
        let state = &mut *guard;

        if let Some(old) = state.entries.remove(&key) {
            state.size_bytes -= old.size_bytes;
            inner.registry.unregister(&old.registry_id);
        }

        if size_bytes > inner.config.max_size_bytes || inner.config.max_entries == 0 {
            state.evictions += 1;
            tracing::debug!(
                cache = %inner.name,
                size_bytes,
                max_size_bytes = inner.config.max_size_bytes,
                "value does not fit in cache; dropped"
            );
            return;
        }

        inner.ensure_capacity(state, size_bytes, now);

        let generation = state.next_generation;
        state.next_generation += 1;
        let touch_seq = state.bump_touch();
        let registry_id = format!("{}:{}", inner.id_prefix, generation);
        let owner = OwnerToken::new();

        let cache = Arc::downgrade(inner);
        let evicted_key = key.clone();
        inner.registry.register(
            Registration::new(registry_id.clone(), inner.config.resource_kind, size_bytes)
                .priority(priority)
                .owner(owner.watch())
                .on_cleanup(move || {
                    if let Some(cache) = cache.upgrade() {
                        cache.evict_generation(&evicted_key, generation);
                    }
                }),
        );

        state.entries.insert(
            key,
            CacheEntry {
                value,
                size_bytes,
                priority,
                created_at: now,
                last_accessed: now,
                access_count: 0,
                touch_seq,
                generation,
                registry_id,
                _owner: owner,
            },
        );
        state.size_bytes += size_bytes;
    }

    /// Remove an entry. Returns whether it was present.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut state = self.inner.state.lock();
        match state.entries.remove(key) {
            Some(entry) => {
                state.size_bytes -= entry.size_bytes;
                self.inner.registry.unregister(&entry.registry_id);
                true
            }
            None => false,
        }
    }

    /// Remove every entry and delete the snapshot file, if any.
    pub fn clear(&self) {
        let drained: Vec<CacheEntry<V>> = {
            let mut state = self.inner.state.lock();
            state.size_bytes = 0;
            state.entries.drain().map(|(_, entry)| entry).collect()
        };

        for entry in &drained {
            self.inner.registry.unregister(&entry.registry_id);
        }
        tracing::debug!(cache = %self.inner.name, entries = drained.len(), "cache cleared");

        if let Some(path) = &self.inner.config.persistence_path {
            if let Err(err) = std::fs::remove_file(path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %path.display(), error = %err, "failed to delete cache snapshot");
                }
            }
        }
    }

    /// Check if a key is cached without updating recency
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.state.lock().entries.contains_key(key)
    }

    /// Get the number of entries
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Returns true if the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the total estimated size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.inner.state.lock().size_bytes
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        CacheStats {
            entries: state.entries.len(),
            size_bytes: state.size_bytes,
            max_size_bytes: self.inner.config.max_size_bytes,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }

    /// Evict entries in policy order
    ///
    /// Frees `target_bytes`, or a quarter of the cache when `None`. Critical
    /// entries are only taken once other entries have been evicted.
    /// Returns the bytes freed.
    pub fn cleanup(&self, target_bytes: Option<u64>) -> u64 {
        let mut state = self.inner.state.lock();
        let target =
            target_bytes.unwrap_or_else(|| fraction_of(state.size_bytes, DEFAULT_CLEANUP_FRACTION));
        self.inner.evict(&mut state, target, 0, false, Instant::now())
    }
}

impl<K, V> fmt::Debug for IntelligentCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("IntelligentCache")
            .field("name", &self.inner.name)
            .field("entries", &state.entries.len())
            .field("size_bytes", &state.size_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::EvictionPolicyKind;
    use color_picker_memory::{CleanupRequest, ManualSampler, MemoryConfig, MemorySample};

    fn registry() -> Arc<ResourceRegistry> {
        ResourceRegistry::new(MemoryConfig::default(), ManualSampler::failing())
    }

    fn small_config(max_bytes: u64, policy: EvictionPolicyKind) -> CacheConfig {
        CacheConfig::default()
            .with_max_size_bytes(max_bytes)
            .with_eviction_policy(policy)
    }

    #[test]
    fn test_basic_put_get() {
        let cache: IntelligentCache<String, String> =
            IntelligentCache::new("colors", CacheConfig::default(), registry());

        cache.put("accent".to_string(), "#ff8800".to_string());

        assert_eq!(cache.get("accent").as_deref(), Some("#ff8800"));
        assert!(cache.contains("accent"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_miss_is_idempotent() {
        let cache: IntelligentCache<u32, u32> =
            IntelligentCache::new("misses", CacheConfig::default(), registry());

        assert!(cache.get(&7).is_none());
        assert!(cache.get(&7).is_none());
        assert_eq!(cache.get_or(&7, 42), 42);

        let stats = cache.stats();
        assert_eq!(stats.misses, 3);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.size_bytes, 0);
    }

    #[test]
    fn test_stats() {
        let cache: IntelligentCache<u32, Vec<u8>> =
            IntelligentCache::new("stats", small_config(1000, EvictionPolicyKind::Lru), registry());

        cache.put_with(1, vec![0; 10], Priority::Normal, Some(250));

        // One hit
        let _ = cache.get(&1);
        // Two misses
        let _ = cache.get(&2);
        let _ = cache.get(&3);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.size_bytes, 250);

        assert!((stats.hit_rate() - 0.333).abs() < 0.01);
        assert!((stats.utilization() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_lru_capacity_scenario() {
        let registry = registry();
        let cache: IntelligentCache<&'static str, u8> =
            IntelligentCache::new("scenario", small_config(400, EvictionPolicyKind::Lru), registry.clone());

        cache.put_with("A", 1, Priority::Normal, Some(100));
        cache.put_with("B", 2, Priority::Normal, Some(200));
        cache.put_with("C", 3, Priority::Normal, Some(300));

        assert!(!cache.contains("A"));
        assert!(!cache.contains("B"));
        assert!(cache.contains("C"));
        assert_eq!(cache.size_bytes(), 300);
        assert_eq!(cache.stats().evictions, 2);
        assert_eq!(registry.current_size(), 300);
    }

    #[test]
    fn test_lru_ordering() {
        let cache: IntelligentCache<u32, u8> =
            IntelligentCache::new("lru", small_config(200, EvictionPolicyKind::Lru), registry());

        cache.put_with(1, 0, Priority::Normal, Some(100));
        cache.put_with(2, 0, Priority::Normal, Some(100));

        // Access 1 to make it more recently used
        assert!(cache.get(&1).is_some());

        // Adding 3 should evict 2 (now least recently used)
        cache.put_with(3, 0, Priority::Normal, Some(100));

        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));
        assert!(cache.contains(&3));
    }

    #[test]
    fn test_lfu_ordering() {
        let cache: IntelligentCache<u32, u8> =
            IntelligentCache::new("lfu", small_config(200, EvictionPolicyKind::Lfu), registry());

        cache.put_with(1, 0, Priority::Normal, Some(100));
        cache.put_with(2, 0, Priority::Normal, Some(100));
        for _ in 0..3 {
            cache.get(&1);
        }
        cache.get(&2);

        cache.put_with(3, 0, Priority::Normal, Some(100));

        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));
    }

    #[test]
    fn test_max_entries_enforced() {
        let config = CacheConfig::default()
            .with_max_entries(3)
            .with_eviction_policy(EvictionPolicyKind::Lru);
        let cache: IntelligentCache<u32, u32> = IntelligentCache::new("entries", config, registry());

        for i in 0..5 {
            cache.put(i, i);
            assert!(cache.len() <= 3);
        }
        assert!(!cache.contains(&0));
        assert!(!cache.contains(&1));
        assert!(cache.contains(&4));
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_capacity_holds_with_only_critical_entries() {
        let cache: IntelligentCache<u32, u8> =
            IntelligentCache::new("critical", small_config(200, EvictionPolicyKind::Adaptive), registry());

        cache.put_with(1, 0, Priority::Critical, Some(150));
        cache.put_with(2, 0, Priority::Critical, Some(150));

        assert!(cache.size_bytes() <= 200);
        assert!(cache.contains(&2));
    }

    #[test]
    fn test_oversized_value_is_dropped() {
        let registry = registry();
        let cache: IntelligentCache<u32, u8> =
            IntelligentCache::new("small", small_config(100, EvictionPolicyKind::Lru), registry.clone());

        cache.put_with(1, 0, Priority::Normal, Some(50));
        cache.put_with(2, 0, Priority::High, Some(101));

        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));
        assert_eq!(cache.size_bytes(), 50);
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(registry.current_size(), 50);
    }

    #[test]
    fn test_replace_does_not_double_count() {
        let registry = registry();
        let cache: IntelligentCache<&'static str, u8> =
            IntelligentCache::new("replace", CacheConfig::default(), registry.clone());

        cache.put_with("k", 1, Priority::Normal, Some(300));
        cache.put_with("k", 2, Priority::Normal, Some(120));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size_bytes(), 120);
        assert_eq!(cache.get("k"), Some(2));
        assert_eq!(registry.current_size(), 120);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_and_clear_unregister() {
        let registry = registry();
        let cache: IntelligentCache<u32, u32> =
            IntelligentCache::new("remove", CacheConfig::default(), registry.clone());

        cache.put_with(1, 1, Priority::Normal, Some(10));
        cache.put_with(2, 2, Priority::Normal, Some(20));
        cache.put_with(3, 3, Priority::Normal, Some(30));

        assert!(cache.remove(&1));
        assert!(!cache.remove(&1));
        assert_eq!(registry.current_size(), 50);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.size_bytes(), 0);
        assert_eq!(registry.current_size(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_cleanup_evicts_cache_entries() {
        let registry = registry();
        let cache: IntelligentCache<u32, u32> =
            IntelligentCache::new("images", CacheConfig::default(), registry.clone());

        cache.put_with(1, 1, Priority::Low, Some(100));
        cache.put_with(2, 2, Priority::High, Some(100));

        let freed = registry.cleanup(CleanupRequest::all().target_bytes(100));

        assert_eq!(freed, 100);
        assert!(!cache.contains(&1));
        assert!(cache.contains(&2));
        assert_eq!(cache.size_bytes(), 100);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_memory_warning_shrinks_cache() {
        let sampler = ManualSampler::new(MemorySample {
            total: 1000,
            available: 100,
            process_resident: 10,
        });
        let registry = ResourceRegistry::new(MemoryConfig::default(), sampler);
        let cache: IntelligentCache<u32, u32> =
            IntelligentCache::new("pressure", CacheConfig::default(), registry.clone());

        for i in 0..10 {
            cache.put_with(i, i, Priority::Normal, Some(100));
        }

        let report = registry.run_monitor_pass();

        // Registry frees 30% of 1000, then the warning halves the remaining 700
        assert!(report.warned);
        assert_eq!(report.bytes_freed, 300);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.size_bytes(), 300);
        assert_eq!(registry.current_size(), 300);
        assert_eq!(cache.stats().evictions, 7);
    }

    #[test]
    fn test_manual_cleanup_protects_critical() {
        let cache: IntelligentCache<u32, u32> =
            IntelligentCache::new("manual", CacheConfig::default(), registry());

        cache.put_with(1, 1, Priority::Critical, Some(1000));
        assert_eq!(cache.cleanup(Some(500)), 0);
        assert!(cache.contains(&1));

        cache.put_with(2, 2, Priority::Normal, Some(200));
        cache.put_with(3, 3, Priority::Normal, Some(200));
        // Default target is a quarter of 1400 bytes
        assert_eq!(cache.cleanup(None), 400);
        assert!(cache.contains(&1));
    }

    #[test]
    fn test_dropped_cache_is_reclaimed_by_registry() {
        let registry = registry();
        {
            let cache: IntelligentCache<u32, Vec<u8>> =
                IntelligentCache::new("scratch", CacheConfig::default(), registry.clone());
            cache.put(1, vec![0; 64]);
            cache.put(2, vec![0; 64]);
            assert_eq!(registry.len(), 2);
        }

        assert_eq!(registry.force_gc(), 2);
        assert_eq!(registry.current_size(), 0);
    }

    #[test]
    fn test_same_name_caches_are_tracked_separately() {
        let registry = registry();
        let a: IntelligentCache<u32, u32> =
            IntelligentCache::new("thumbs", CacheConfig::default(), registry.clone());
        let b: IntelligentCache<u32, u32> =
            IntelligentCache::new("thumbs", CacheConfig::default(), registry.clone());

        a.put_with(1, 1, Priority::Normal, Some(100));
        b.put_with(1, 1, Priority::Normal, Some(300));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.current_size(), 400);

        assert!(a.remove(&1));
        assert_eq!(b.size_bytes(), 300);
        assert_eq!(registry.current_size(), 300);

        // b's entry is still reachable by registry cleanup
        let freed = registry.cleanup(CleanupRequest::all().target_bytes(300));
        assert_eq!(freed, 300);
        assert!(b.is_empty());
    }

    #[test]
    fn test_dropped_caches_unsubscribe_from_registry() {
        let registry = registry();
        for i in 0..500 {
            let cache: IntelligentCache<u32, u32> =
                IntelligentCache::new(format!("scratch-{}", i), CacheConfig::default(), registry.clone());
            cache.put(i, i);
        }

        assert_eq!(registry.force_gc(), 500);
        assert_eq!(registry.observer_count(), 0);
        assert_eq!(registry.current_size(), 0);

        let live: IntelligentCache<u32, u32> =
            IntelligentCache::new("live", CacheConfig::default(), registry.clone());
        registry.force_gc();
        assert_eq!(registry.observer_count(), 1);
        assert_eq!(live.name(), "live");
    }

    #[test]
    fn test_clones_share_state() {
        let cache: IntelligentCache<u32, u32> =
            IntelligentCache::new("shared", CacheConfig::default(), registry());
        let other = cache.clone();

        cache.put(1, 10);
        assert_eq!(other.get(&1), Some(10));
        assert_eq!(other.name(), "shared");
    }

    #[test]
    fn test_shutdown_empties_cache() {
        let registry = registry();
        let cache: IntelligentCache<u32, u32> =
            IntelligentCache::new("shutdown", CacheConfig::default(), registry.clone());
        cache.put_with(1, 1, Priority::Critical, Some(10));
        cache.put_with(2, 2, Priority::Normal, Some(10));

        registry.shutdown();

        assert!(cache.is_empty());
        assert_eq!(cache.size_bytes(), 0);
    }
}
