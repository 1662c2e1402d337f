//! Process-wide resource registry
//!
//! Tracks the estimated size, priority and recency of every cached resource,
//! samples memory pressure, and evicts resources before the process runs out
//! of memory. The registry only holds metadata: eviction runs the cleanup
//! action supplied by the resource's owner, which does the actual release.
//!
//! Descriptors are sharded by [`ResourceKind`], one lock per kind. No lock is
//! held while cleanup actions or observers run.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::monitor::MonitorHandle;
use crate::observer::{CleanupFn, WarningFn};
use crate::pressure::fraction_of;
use crate::{
    Liveness, MemoryConfig, MemoryObserver, MemorySampler, MemoryStats, Priority, ResourceInfo,
    ResourceKind, SystemSampler,
};

/// Action run once when the registry evicts a resource.
pub type CleanupAction = Box<dyn FnOnce() + Send>;

type LazyLoader = Arc<dyn Fn() -> Option<Box<dyn Any + Send>> + Send + Sync>;

/// Loader registered for a resource id, and whether it has produced the
/// resource since the id was last evicted or unregistered.
struct LazySlot {
    loader: LazyLoader,
    loaded: bool,
}

/// Descriptors above this count trigger a recommendation.
const MANY_RESOURCES: usize = 1000;

/// Kinds with more descriptors than this are eligible for cold trimming.
const COLD_TRIM_MIN_ENTRIES: usize = 10;

/// Registration request for a resource.
///
/// # Example
///
/// ```
/// use color_picker_memory::{ManualSampler, MemoryConfig, Priority, Registration, ResourceKind, ResourceRegistry};
///
/// let registry = ResourceRegistry::new(MemoryConfig::default(), ManualSampler::failing());
/// registry.register(
///     Registration::new("thumbnail:42", ResourceKind::ImageCache, 64 * 1024)
///         .priority(Priority::Low)
///         .on_cleanup(|| println!("thumbnail released")),
/// );
/// assert_eq!(registry.current_size(), 64 * 1024);
/// ```
pub struct Registration {
    id: String,
    kind: ResourceKind,
    size_bytes: u64,
    priority: Priority,
    cleanup_action: Option<CleanupAction>,
    owner: Option<Box<dyn Liveness>>,
}

impl Registration {
    /// Start a registration with normal priority.
    pub fn new(id: impl Into<String>, kind: ResourceKind, size_bytes: u64) -> Self {
        Self {
            id: id.into(),
            kind,
            size_bytes,
            priority: Priority::Normal,
            cleanup_action: None,
            owner: None,
        }
    }

    /// Set the retention priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the action run when the registry evicts this resource.
    pub fn on_cleanup<F>(mut self, action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.cleanup_action = Some(Box::new(action));
        self
    }

    /// Bind the registration to an owner; it is reclaimed once the owner is gone.
    pub fn owner<L>(mut self, owner: L) -> Self
    where
        L: Liveness + 'static,
    {
        self.owner = Some(Box::new(owner));
        self
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("size_bytes", &self.size_bytes)
            .field("priority", &self.priority)
            .field("has_cleanup_action", &self.cleanup_action.is_some())
            .field("has_owner", &self.owner.is_some())
            .finish()
    }
}

/// Parameters of a cleanup pass.
#[derive(Debug, Clone, Default)]
pub struct CleanupRequest {
    target_bytes: Option<u64>,
    kinds: Option<Vec<ResourceKind>>,
    force: bool,
}

impl CleanupRequest {
    /// Cleanup over every kind with the default target.
    pub fn all() -> Self {
        Self::default()
    }

    /// Number of bytes to free.
    pub fn target_bytes(mut self, bytes: u64) -> Self {
        self.target_bytes = Some(bytes);
        self
    }

    /// Restrict the cleanup to these kinds.
    pub fn kinds(mut self, kinds: &[ResourceKind]) -> Self {
        self.kinds = Some(kinds.to_vec());
        self
    }

    /// Allow evicting critical resources without prior progress.
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Per-kind summary of tracked resources.
#[derive(Debug, Clone, PartialEq)]
pub struct KindSummary {
    /// Number of descriptors
    pub count: usize,
    /// Sum of their sizes in bytes
    pub total_bytes: u64,
    /// Average size in bytes
    pub average_bytes: f64,
    /// Least recent access
    pub oldest_access: Instant,
    /// Most recent access
    pub newest_access: Instant,
}

/// Result of [`ResourceRegistry::force_cleanup`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForceCleanupReport {
    /// Resources evicted
    pub resources_cleaned: usize,
    /// Bytes released
    pub bytes_freed: u64,
}

/// Result of one monitor pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MonitorReport {
    /// Pressure observed at the start of the pass
    pub pressure: f64,
    /// Bytes released by cleanup
    pub bytes_freed: u64,
    /// Descriptors reclaimed because their owner was gone
    pub reclaimed: usize,
    /// Warning observers were notified
    pub warned: bool,
    /// The hard memory limit was exceeded
    pub emergency: bool,
}

/// Result of [`ResourceRegistry::optimize`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OptimizationReport {
    /// Descriptors reclaimed because their owner was gone
    pub reclaimed: usize,
    /// Pressure observed before cleanup
    pub pressure: f64,
    /// Bytes released by pressure-driven cleanup
    pub pressure_bytes_freed: u64,
    /// Rarely used resources trimmed
    pub cold_trimmed: usize,
    /// Bytes released by the cold trim
    pub cold_bytes_freed: u64,
}

impl OptimizationReport {
    /// Total bytes released.
    pub fn bytes_freed(&self) -> u64 {
        self.pressure_bytes_freed + self.cold_bytes_freed
    }
}

/// Advice derived from the current memory situation.
#[derive(Debug, Clone, PartialEq)]
pub enum Recommendation {
    /// Pressure is above 0.8
    CriticalPressure { pressure: f64 },
    /// Pressure is above 0.6
    HighPressure { pressure: f64 },
    /// Tracked bytes exceed the advisory cache budget
    CacheOverBudget { cached_bytes: u64, budget_bytes: u64 },
    /// An unusually large number of resources is tracked
    ManyResources { count: usize },
    /// Process memory grew by more than half since the previous check
    PossibleLeak { previous_bytes: u64, current_bytes: u64 },
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::CriticalPressure { pressure } => write!(
                f,
                "memory pressure is critical ({:.0}%); close unused documents",
                pressure * 100.0
            ),
            Recommendation::HighPressure { pressure } => write!(
                f,
                "memory pressure is high ({:.0}%); clear caches or reduce image sizes",
                pressure * 100.0
            ),
            Recommendation::CacheOverBudget {
                cached_bytes,
                budget_bytes,
            } => write!(
                f,
                "caches hold {} MB, above the {} MB budget",
                cached_bytes / (1024 * 1024),
                budget_bytes / (1024 * 1024)
            ),
            Recommendation::ManyResources { count } => {
                write!(f, "{} resources tracked; consider releasing unused ones", count)
            }
            Recommendation::PossibleLeak {
                previous_bytes,
                current_bytes,
            } => write!(
                f,
                "process memory grew from {} MB to {} MB; possible leak",
                previous_bytes / (1024 * 1024),
                current_bytes / (1024 * 1024)
            ),
        }
    }
}

/// Metadata the registry keeps for one resource.
struct ResourceDescriptor {
    id: String,
    kind: ResourceKind,
    priority: Priority,
    size_bytes: u64,
    created_at: Instant,
    last_accessed: Instant,
    access_count: u64,
    /// Distinguishes re-registrations of the same id
    serial: u64,
    cleanup_action: Option<CleanupAction>,
    owner: Option<Box<dyn Liveness>>,
}

impl ResourceDescriptor {
    fn is_orphaned(&self) -> bool {
        self.owner.as_ref().is_some_and(|owner| !owner.is_alive())
    }

    fn touch(&mut self, now: Instant) {
        if now > self.last_accessed {
            self.last_accessed = now;
        }
        self.access_count += 1;
    }

    /// Higher scores are evicted first.
    fn eviction_score(&self, now: Instant) -> f64 {
        let age = now.saturating_duration_since(self.last_accessed).as_secs_f64();
        let priority = f64::from(self.priority.eviction_rank()) * 1000.0;
        let accesses = self.access_count.max(1) as f64;
        (age + priority) / accesses
    }

    fn info(&self) -> ResourceInfo {
        ResourceInfo {
            id: self.id.clone(),
            kind: self.kind,
            priority: self.priority,
            size_bytes: self.size_bytes,
            created_at: self.created_at,
            last_accessed: self.last_accessed,
            access_count: self.access_count,
        }
    }
}

/// Descriptors of one resource kind.
#[derive(Default)]
struct Shard {
    descriptors: HashMap<String, ResourceDescriptor>,
    size_bytes: u64,
}

impl Shard {
    fn insert(&mut self, descriptor: ResourceDescriptor) -> Option<ResourceDescriptor> {
        self.size_bytes += descriptor.size_bytes;
        let replaced = self.descriptors.insert(descriptor.id.clone(), descriptor);
        if let Some(old) = &replaced {
            self.size_bytes -= old.size_bytes;
        }
        replaced
    }

    fn remove(&mut self, id: &str) -> Option<ResourceDescriptor> {
        let descriptor = self.descriptors.remove(id)?;
        self.size_bytes -= descriptor.size_bytes;
        Some(descriptor)
    }
}

/// Snapshot used to order eviction victims outside the shard locks.
struct Candidate {
    id: String,
    kind: ResourceKind,
    serial: u64,
    priority: Priority,
    score: f64,
}

/// Process-wide tracker of cached resources.
///
/// Constructed once at startup and shared as `Arc<ResourceRegistry>`.
///
/// # Example
///
/// ```
/// use color_picker_memory::{CleanupRequest, ManualSampler, MemoryConfig, Priority, ResourceKind, ResourceRegistry};
///
/// let registry = ResourceRegistry::new(MemoryConfig::default(), ManualSampler::failing());
/// registry.register_resource("palette:warm", ResourceKind::PaletteCache, 600, Priority::Normal);
/// registry.register_resource("palette:cool", ResourceKind::PaletteCache, 400, Priority::Low);
///
/// let freed = registry.cleanup(CleanupRequest::all().target_bytes(300));
/// assert_eq!(freed, 400); // the low-priority palette goes first
///
/// registry.shutdown();
/// ```
pub struct ResourceRegistry {
    config: MemoryConfig,
    shards: [Mutex<Shard>; ResourceKind::COUNT],
    /// Sum of all shard sizes; only updated while holding the shard's lock
    current_size: AtomicU64,
    next_serial: AtomicU64,
    sampler: Mutex<Box<dyn MemorySampler>>,
    last_stats: Mutex<MemoryStats>,
    previous_process_memory: Mutex<Option<u64>>,
    observers: RwLock<Vec<Arc<dyn MemoryObserver>>>,
    lazy_loaders: Mutex<HashMap<String, LazySlot>>,
    shut_down: AtomicBool,
    monitor: Mutex<Option<MonitorHandle>>,
}

impl ResourceRegistry {
    /// Create a registry without a monitor thread.
    pub fn new<S>(config: MemoryConfig, sampler: S) -> Arc<Self>
    where
        S: MemorySampler + 'static,
    {
        Arc::new(Self {
            config,
            shards: std::array::from_fn(|_| Mutex::new(Shard::default())),
            current_size: AtomicU64::new(0),
            next_serial: AtomicU64::new(0),
            sampler: Mutex::new(Box::new(sampler)),
            last_stats: Mutex::new(MemoryStats::default()),
            previous_process_memory: Mutex::new(None),
            observers: RwLock::new(Vec::new()),
            lazy_loaders: Mutex::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
            monitor: Mutex::new(None),
        })
    }

    /// Create a registry that samples the real system and start its monitor.
    pub fn start(config: MemoryConfig) -> Arc<Self> {
        let registry = Self::new(config, SystemSampler::new());
        registry.start_monitor();
        registry
    }

    /// Start the background monitor thread. Does nothing if it is already
    /// running or the registry has been shut down.
    pub fn start_monitor(self: &Arc<Self>) {
        if self.is_shut_down() {
            return;
        }

        let mut slot = self.monitor.lock();
        if slot.is_some() {
            return;
        }

        match MonitorHandle::spawn(Arc::downgrade(self), self.config.monitor_interval) {
            Ok(handle) => *slot = Some(handle),
            Err(err) => {
                tracing::warn!(error = %err, "failed to spawn memory monitor; pressure is only checked on demand");
            }
        }
    }

    /// Returns true if the monitor thread is running.
    pub fn is_monitoring(&self) -> bool {
        self.monitor.lock().is_some()
    }

    /// Get the configuration
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn shard(&self, kind: ResourceKind) -> &Mutex<Shard> {
        &self.shards[kind.index()]
    }

    /// Register or replace a resource.
    ///
    /// Replacing an id changes the tracked total by the size difference, even
    /// when the old registration was filed under another kind. The replaced
    /// registration's cleanup action is dropped without running.
    pub fn register(&self, registration: Registration) {
        if self.is_shut_down() {
            tracing::trace!(id = %registration.id, "registry shut down; registration ignored");
            return;
        }

        let Registration {
            id,
            kind,
            size_bytes,
            priority,
            cleanup_action,
            owner,
        } = registration;

        let now = Instant::now();
        let descriptor = ResourceDescriptor {
            id,
            kind,
            priority,
            size_bytes,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            serial: self.next_serial.fetch_add(1, Ordering::Relaxed),
            cleanup_action,
            owner,
        };

        // Every shard is locked, in kind order, so an id lives in at most one
        // shard and `current_size` moves once by the net difference.
        let replaced: Vec<ResourceDescriptor> = {
            let mut shards: Vec<_> = self.shards.iter().map(|shard| shard.lock()).collect();
            let mut replaced: Vec<_> = shards
                .iter_mut()
                .enumerate()
                .filter(|(index, _)| *index != kind.index())
                .filter_map(|(_, shard)| shard.remove(&descriptor.id))
                .collect();
            replaced.extend(shards[kind.index()].insert(descriptor));

            let removed: u64 = replaced.iter().map(|old| old.size_bytes).sum();
            if size_bytes >= removed {
                self.current_size
                    .fetch_add(size_bytes - removed, Ordering::AcqRel);
            } else {
                self.current_size
                    .fetch_sub(removed - size_bytes, Ordering::AcqRel);
            }
            replaced
        };

        // Replaced cleanup actions are dropped here, outside the locks
        for old in replaced {
            tracing::trace!(
                id = %old.id,
                old_kind = %old.kind,
                old_size = old.size_bytes,
                new_size = size_bytes,
                "resource replaced"
            );
        }
    }

    /// Register a resource without cleanup action or owner.
    pub fn register_resource(
        &self,
        id: impl Into<String>,
        kind: ResourceKind,
        size_bytes: u64,
        priority: Priority,
    ) {
        self.register(Registration::new(id, kind, size_bytes).priority(priority));
    }

    /// Remove a resource without running its cleanup action.
    ///
    /// Returns whether anything was removed.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = ResourceKind::ALL
            .into_iter()
            .any(|kind| self.take(kind, id, None).is_some());
        if removed {
            self.mark_unloaded(id);
        }
        removed
    }

    /// Remove a descriptor from one shard, optionally only if it is the
    /// registration with the given serial.
    fn take(&self, kind: ResourceKind, id: &str, serial: Option<u64>) -> Option<ResourceDescriptor> {
        let mut shard = self.shard(kind).lock();
        if let Some(serial) = serial {
            if shard.descriptors.get(id)?.serial != serial {
                return None;
            }
        }
        let descriptor = shard.remove(id)?;
        self.current_size
            .fetch_sub(descriptor.size_bytes, Ordering::AcqRel);
        Some(descriptor)
    }

    /// Record an access to a resource. Unknown ids are ignored.
    pub fn access(&self, id: &str) {
        let now = Instant::now();
        for kind in ResourceKind::ALL {
            let mut shard = self.shard(kind).lock();
            if let Some(descriptor) = shard.descriptors.get_mut(id) {
                descriptor.touch(now);
                return;
            }
        }
    }

    /// Snapshot of a registered resource.
    pub fn resource(&self, id: &str) -> Option<ResourceInfo> {
        ResourceKind::ALL.into_iter().find_map(|kind| {
            self.shard(kind)
                .lock()
                .descriptors
                .get(id)
                .map(ResourceDescriptor::info)
        })
    }

    /// Returns true if `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        ResourceKind::ALL
            .into_iter()
            .any(|kind| self.shard(kind).lock().descriptors.contains_key(id))
    }

    /// Number of registered resources.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().descriptors.len()).sum()
    }

    /// Returns true if no resources are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total estimated bytes of all registered resources.
    pub fn current_size(&self) -> u64 {
        self.current_size.load(Ordering::Acquire)
    }

    /// Estimated bytes registered under one kind.
    pub fn kind_size(&self, kind: ResourceKind) -> u64 {
        self.shard(kind).lock().size_bytes
    }

    /// Sample system and process memory.
    ///
    /// If the platform query fails the last known figures are returned
    /// (zeroed before the first successful sample), with `cached_memory`
    /// always current.
    pub fn memory_stats(&self) -> MemoryStats {
        let sample = {
            let mut sampler = self.sampler.lock();
            panic::catch_unwind(AssertUnwindSafe(|| sampler.sample()))
                .ok()
                .flatten()
        };

        let cached_memory = self.current_size();
        let mut last = self.last_stats.lock();
        match sample {
            Some(sample) => {
                *last = MemoryStats {
                    total_memory: sample.total,
                    available_memory: sample.available,
                    process_memory: sample.process_resident,
                    memory_percent: sample.process_percent(),
                    cached_memory,
                };
            }
            None => {
                tracing::debug!("memory sampling failed; using last known stats");
                last.cached_memory = cached_memory;
            }
        }
        *last
    }

    /// Current memory pressure (0.0 to 1.0).
    pub fn check_pressure(&self) -> f64 {
        self.memory_stats().pressure()
    }

    /// Evict resources until `request`'s target is met.
    ///
    /// Resources are ordered by `(idle seconds + priority rank * 1000) /
    /// max(1, accesses)`, highest first. Non-critical resources are taken
    /// first; critical ones only if the target is still unmet and either the
    /// request is forced or something has already been freed.
    ///
    /// Returns the number of bytes freed.
    pub fn cleanup(&self, request: CleanupRequest) -> u64 {
        if self.is_shut_down() {
            return 0;
        }
        self.cleanup_inner(&request)
    }

    fn cleanup_inner(&self, request: &CleanupRequest) -> u64 {
        self.sweep_orphans();

        let target = request.target_bytes.unwrap_or_else(|| {
            fraction_of(self.current_size(), self.config.default_cleanup_fraction)
        });
        if target == 0 {
            return 0;
        }

        let kinds = request.kinds.as_deref().unwrap_or(&ResourceKind::ALL);
        let (critical, regular): (Vec<_>, Vec<_>) = self
            .eviction_candidates(kinds)
            .into_iter()
            .partition(|candidate| candidate.priority.is_critical());

        let mut freed = 0u64;
        let mut evicted = 0usize;
        for candidate in &regular {
            if freed >= target {
                break;
            }
            if let Some(bytes) = self.evict(candidate) {
                freed += bytes;
                evicted += 1;
            }
        }

        if freed < target && (request.force || freed > 0) {
            for candidate in &critical {
                if freed >= target {
                    break;
                }
                if let Some(bytes) = self.evict(candidate) {
                    freed += bytes;
                    evicted += 1;
                }
            }
        }

        tracing::debug!(
            target,
            freed,
            evicted,
            force = request.force,
            remaining = self.current_size(),
            "registry cleanup finished"
        );
        freed
    }

    /// Candidates of the given kinds, most evictable first.
    fn eviction_candidates(&self, kinds: &[ResourceKind]) -> Vec<Candidate> {
        let now = Instant::now();
        let mut candidates = Vec::new();
        for &kind in kinds {
            let shard = self.shard(kind).lock();
            candidates.extend(shard.descriptors.values().map(|descriptor| Candidate {
                id: descriptor.id.clone(),
                kind,
                serial: descriptor.serial,
                priority: descriptor.priority,
                score: descriptor.eviction_score(now),
            }));
        }
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates
    }

    /// Remove a candidate and run its cleanup action with no lock held.
    ///
    /// Returns `None` if another thread removed or replaced it first.
    fn evict(&self, candidate: &Candidate) -> Option<u64> {
        let descriptor = self.take(candidate.kind, &candidate.id, Some(candidate.serial))?;
        let ResourceDescriptor {
            id,
            kind,
            size_bytes,
            cleanup_action,
            ..
        } = descriptor;

        if let Some(action) = cleanup_action {
            if panic::catch_unwind(AssertUnwindSafe(action)).is_err() {
                tracing::warn!(%id, "cleanup action panicked; resource dropped from registry");
            }
        }
        tracing::debug!(%id, %kind, size_bytes, "resource evicted");
        self.mark_unloaded(&id);

        self.notify_cleanup(kind, size_bytes);
        Some(size_bytes)
    }

    /// Drop descriptors whose owner is gone. Returns how many were dropped.
    fn sweep_orphans(&self) -> usize {
        let mut reclaimed = Vec::new();
        for kind in ResourceKind::ALL {
            let mut shard = self.shard(kind).lock();
            let dead: Vec<String> = shard
                .descriptors
                .values()
                .filter(|descriptor| descriptor.is_orphaned())
                .map(|descriptor| descriptor.id.clone())
                .collect();
            for id in dead {
                if let Some(descriptor) = shard.remove(&id) {
                    self.current_size
                        .fetch_sub(descriptor.size_bytes, Ordering::AcqRel);
                    reclaimed.push(descriptor);
                }
            }
        }

        if !reclaimed.is_empty() {
            tracing::debug!(count = reclaimed.len(), "reclaimed resources whose owner is gone");
        }
        self.prune_observers();
        reclaimed.len()
    }

    /// Reclaim descriptors whose owner is gone and drop inactive observers.
    ///
    /// Returns the number of descriptors reclaimed.
    pub fn force_gc(&self) -> usize {
        if self.is_shut_down() {
            return 0;
        }
        self.sweep_orphans()
    }

    /// Register a loader that produces the resource `id` on demand.
    ///
    /// The loader typically builds the value and registers it; it returns
    /// `None` when loading fails. Replaces any earlier loader for `id`.
    pub fn register_lazy_loader<T, F>(&self, id: impl Into<String>, loader: F)
    where
        T: Send + 'static,
        F: Fn() -> Option<T> + Send + Sync + 'static,
    {
        if self.is_shut_down() {
            return;
        }
        let loader: LazyLoader =
            Arc::new(move || loader().map(|value| Box::new(value) as Box<dyn Any + Send>));
        self.lazy_loaders
            .lock()
            .insert(id.into(), LazySlot { loader, loaded: false });
    }

    /// Drop the loader for `id`. Returns whether one was registered.
    pub fn remove_lazy_loader(&self, id: &str) -> bool {
        self.lazy_loaders.lock().remove(id).is_some()
    }

    /// Returns true if a loader is registered for `id`.
    pub fn has_lazy_loader(&self, id: &str) -> bool {
        self.lazy_loaders.lock().contains_key(id)
    }

    /// Returns true if the loader for `id` produced its resource and the
    /// resource has not been evicted or unregistered since.
    pub fn is_lazy_loaded(&self, id: &str) -> bool {
        self.lazy_loaders.lock().get(id).is_some_and(|slot| slot.loaded)
    }

    /// Load `id` through its lazy loader.
    ///
    /// Returns the freshly loaded value. Returns `None` if no loader is
    /// registered, if the resource is already loaded (its access is
    /// recorded instead), or if the loader fails, panics or produces a
    /// value of another type. The loader runs with no lock held; two
    /// threads loading the same id at once may both run it.
    pub fn load_lazy<T: 'static>(&self, id: &str) -> Option<T> {
        if self.is_shut_down() {
            return None;
        }

        let loader = {
            let loaders = self.lazy_loaders.lock();
            let slot = loaders.get(id)?;
            if slot.loaded {
                None
            } else {
                Some(slot.loader.clone())
            }
        };
        let Some(loader) = loader else {
            self.access(id);
            return None;
        };

        let loaded = match panic::catch_unwind(AssertUnwindSafe(|| loader())) {
            Ok(Some(value)) => value,
            Ok(None) => {
                tracing::debug!(%id, "lazy loader produced nothing");
                return None;
            }
            Err(_) => {
                tracing::warn!(%id, "lazy loader panicked");
                return None;
            }
        };
        let value = match loaded.downcast::<T>() {
            Ok(value) => *value,
            Err(_) => {
                tracing::warn!(%id, "lazy loader produced a value of another type");
                return None;
            }
        };

        if let Some(slot) = self.lazy_loaders.lock().get_mut(id) {
            slot.loaded = true;
        }
        self.access(id);
        tracing::debug!(%id, "resource loaded lazily");
        Some(value)
    }

    fn mark_unloaded(&self, id: &str) {
        if let Some(slot) = self.lazy_loaders.lock().get_mut(id) {
            slot.loaded = false;
        }
    }

    /// Subscribe an observer.
    pub fn add_observer(&self, observer: Arc<dyn MemoryObserver>) {
        if self.is_shut_down() {
            return;
        }
        self.prune_observers();
        self.observers.write().push(observer);
    }

    /// Call `callback` whenever memory pressure crosses the cleanup threshold.
    pub fn add_memory_warning_callback<F>(&self, callback: F)
    where
        F: Fn(&MemoryStats) + Send + Sync + 'static,
    {
        self.add_observer(Arc::new(WarningFn(callback)));
    }

    /// Call `callback` after every resource the registry evicts.
    pub fn add_cleanup_callback<F>(&self, callback: F)
    where
        F: Fn(ResourceKind, u64) + Send + Sync + 'static,
    {
        self.add_observer(Arc::new(CleanupFn(callback)));
    }

    /// Number of subscribed observers.
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Drop inactive observers from the list. Returns how many were dropped.
    fn prune_observers(&self) -> usize {
        let inactive: Vec<Arc<dyn MemoryObserver>> = {
            let mut observers = self.observers.write();
            if observers.iter().all(|observer| observer.is_active()) {
                return 0;
            }
            let (active, inactive) = observers
                .drain(..)
                .partition(|observer| observer.is_active());
            *observers = active;
            inactive
        };
        tracing::trace!(count = inactive.len(), "dropped inactive observers");
        inactive.len()
    }

    /// Active observers; inactive ones are dropped from the list.
    fn active_observers(&self) -> Vec<Arc<dyn MemoryObserver>> {
        self.prune_observers();
        self.observers.read().clone()
    }

    fn notify_warning(&self, stats: &MemoryStats) {
        for observer in self.active_observers() {
            let delivered =
                panic::catch_unwind(AssertUnwindSafe(|| observer.on_memory_warning(stats)));
            if delivered.is_err() {
                tracing::warn!("memory warning observer panicked");
            }
        }
    }

    fn notify_cleanup(&self, kind: ResourceKind, bytes: u64) {
        let observers: Vec<_> = self.observers.read().clone();
        for observer in observers {
            let delivered =
                panic::catch_unwind(AssertUnwindSafe(|| observer.on_cleanup(kind, bytes)));
            if delivered.is_err() {
                tracing::warn!(%kind, "cleanup observer panicked");
            }
        }
    }

    /// Run one monitor iteration.
    ///
    /// The monitor thread calls this every interval; it can also be called
    /// directly, for example after a burst of allocations.
    pub fn run_monitor_pass(&self) -> MonitorReport {
        let mut report = MonitorReport::default();
        if self.is_shut_down() {
            return report;
        }

        report.reclaimed = self.sweep_orphans();
        let stats = self.memory_stats();
        report.pressure = stats.pressure();

        if report.pressure > self.config.cleanup_threshold {
            tracing::warn!(
                pressure = report.pressure,
                threshold = self.config.cleanup_threshold,
                cached_bytes = stats.cached_memory,
                "memory pressure above cleanup threshold"
            );
            let target = fraction_of(self.current_size(), self.config.pressure_cleanup_fraction);
            report.bytes_freed += self.cleanup_inner(&CleanupRequest::all().target_bytes(target));
            report.reclaimed += self.sweep_orphans();
            self.notify_warning(&stats);
            report.warned = true;
        }

        if stats.process_memory > self.config.memory_limit_bytes {
            tracing::warn!(
                process_bytes = stats.process_memory,
                limit_bytes = self.config.memory_limit_bytes,
                "process memory above hard limit; emergency cleanup"
            );
            let target = fraction_of(self.current_size(), self.config.emergency_cleanup_fraction);
            report.bytes_freed +=
                self.cleanup_inner(&CleanupRequest::all().target_bytes(target).force());
            report.reclaimed += self.sweep_orphans();
            report.emergency = true;
        }

        report
    }

    /// Per-kind summary of tracked resources. Kinds without resources are omitted.
    pub fn summary(&self) -> BTreeMap<ResourceKind, KindSummary> {
        self.sweep_orphans();

        let mut summary = BTreeMap::new();
        for kind in ResourceKind::ALL {
            let shard = self.shard(kind).lock();
            let mut descriptors = shard.descriptors.values();
            let Some(first) = descriptors.next() else {
                continue;
            };

            let mut entry = KindSummary {
                count: 1,
                total_bytes: first.size_bytes,
                average_bytes: 0.0,
                oldest_access: first.last_accessed,
                newest_access: first.last_accessed,
            };
            for descriptor in descriptors {
                entry.count += 1;
                entry.total_bytes += descriptor.size_bytes;
                entry.oldest_access = entry.oldest_access.min(descriptor.last_accessed);
                entry.newest_access = entry.newest_access.max(descriptor.last_accessed);
            }
            entry.average_bytes = entry.total_bytes as f64 / entry.count as f64;
            summary.insert(kind, entry);
        }
        summary
    }

    /// Evict every low and normal priority resource.
    pub fn force_cleanup(&self) -> ForceCleanupReport {
        let mut report = ForceCleanupReport::default();
        if self.is_shut_down() {
            return report;
        }

        let candidates: Vec<_> = self
            .eviction_candidates(&ResourceKind::ALL)
            .into_iter()
            .filter(|candidate| candidate.priority <= Priority::Normal)
            .collect();
        for candidate in &candidates {
            if let Some(bytes) = self.evict(candidate) {
                report.resources_cleaned += 1;
                report.bytes_freed += bytes;
            }
        }

        tracing::info!(
            resources = report.resources_cleaned,
            bytes = report.bytes_freed,
            "forced cleanup of low and normal priority resources"
        );
        report
    }

    /// Advice derived from the current memory situation.
    pub fn recommendations(&self) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();
        let stats = self.memory_stats();
        let pressure = stats.pressure();

        if pressure > 0.8 {
            recommendations.push(Recommendation::CriticalPressure { pressure });
        } else if pressure > 0.6 {
            recommendations.push(Recommendation::HighPressure { pressure });
        }

        if stats.cached_memory > self.config.cache_limit_bytes {
            recommendations.push(Recommendation::CacheOverBudget {
                cached_bytes: stats.cached_memory,
                budget_bytes: self.config.cache_limit_bytes,
            });
        }

        let count = self.len();
        if count > MANY_RESOURCES {
            recommendations.push(Recommendation::ManyResources { count });
        }

        let mut previous = self.previous_process_memory.lock();
        if let Some(previous_bytes) = *previous {
            if previous_bytes > 0 && stats.process_memory as f64 > previous_bytes as f64 * 1.5 {
                recommendations.push(Recommendation::PossibleLeak {
                    previous_bytes,
                    current_bytes: stats.process_memory,
                });
            }
        }
        *previous = Some(stats.process_memory);

        recommendations
    }

    /// Comprehensive optimization pass.
    ///
    /// Reclaims orphaned descriptors, runs a pressure-dependent cleanup
    /// (forced above 0.7, regular above 0.5), then trims the least accessed
    /// fifth of every kind holding more than ten resources. Critical
    /// resources are never trimmed.
    pub fn optimize(&self) -> OptimizationReport {
        let mut report = OptimizationReport::default();
        if self.is_shut_down() {
            return report;
        }

        report.reclaimed = self.sweep_orphans();
        report.pressure = self.check_pressure();
        if report.pressure > 0.7 {
            report.pressure_bytes_freed = self.cleanup_inner(&CleanupRequest::all().force());
        } else if report.pressure > 0.5 {
            report.pressure_bytes_freed = self.cleanup_inner(&CleanupRequest::all());
        }

        for kind in ResourceKind::ALL {
            let mut cold: Vec<(u64, Candidate)> = {
                let shard = self.shard(kind).lock();
                if shard.descriptors.len() <= COLD_TRIM_MIN_ENTRIES {
                    continue;
                }
                shard
                    .descriptors
                    .values()
                    .filter(|descriptor| !descriptor.priority.is_critical())
                    .map(|descriptor| {
                        (
                            descriptor.access_count,
                            Candidate {
                                id: descriptor.id.clone(),
                                kind,
                                serial: descriptor.serial,
                                priority: descriptor.priority,
                                score: 0.0,
                            },
                        )
                    })
                    .collect()
            };

            cold.sort_by(|a, b| b.0.cmp(&a.0));
            let keep = cold.len() * 8 / 10;
            for (_, candidate) in cold.iter().skip(keep) {
                if let Some(bytes) = self.evict(candidate) {
                    report.cold_trimmed += 1;
                    report.cold_bytes_freed += bytes;
                }
            }
        }

        tracing::info!(
            reclaimed = report.reclaimed,
            pressure = report.pressure,
            bytes_freed = report.bytes_freed(),
            cold_trimmed = report.cold_trimmed,
            "memory optimization finished"
        );
        report
    }

    /// Stop monitoring, evict everything, and drop all observers.
    ///
    /// Waits at most `shutdown_timeout` for the monitor thread. Calling it
    /// again is a no-op, and so is every registry operation afterwards.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(tracked = self.len(), bytes = self.current_size(), "shutting down resource registry");

        let monitor = self.monitor.lock().take();
        if let Some(monitor) = monitor {
            monitor.stop(self.config.shutdown_timeout);
        }

        let freed = self.cleanup_inner(&CleanupRequest::all().target_bytes(u64::MAX).force());
        self.observers.write().clear();
        let loaders = std::mem::take(&mut *self.lazy_loaders.lock());
        drop(loaders);

        tracing::debug!(freed, "resource registry shut down");
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("resources", &self.len())
            .field("current_size", &self.current_size())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}
