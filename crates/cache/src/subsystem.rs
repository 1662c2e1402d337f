//! Application-wide memory subsystem
//!
//! Bundles the registry, the cache manager and the cleanup manager so the
//! application can create them once at startup and tear them down in the
//! right order at exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use color_picker_memory::{MemoryConfig, ResourceCleanupManager, ResourceRegistry};

use crate::manager::CacheManager;

/// Registry, caches and cleanup handlers of one application instance.
///
/// # Example
///
/// ```
/// use color_picker_cache::{CacheConfig, MemorySubsystem};
/// use color_picker_memory::{ManualSampler, MemoryConfig, ResourceRegistry};
///
/// let registry = ResourceRegistry::new(MemoryConfig::default(), ManualSampler::failing());
/// let memory = MemorySubsystem::with_registry(registry);
///
/// let thumbnails = memory
///     .caches()
///     .create::<u64, Vec<u8>>("thumbnails", CacheConfig::new(32, 500))
///     .unwrap();
/// thumbnails.put(7, vec![0u8; 1024]);
///
/// memory.shutdown();
/// assert!(thumbnails.is_empty());
/// ```
#[derive(Debug)]
pub struct MemorySubsystem {
    registry: Arc<ResourceRegistry>,
    caches: CacheManager,
    cleanup: ResourceCleanupManager,
    shut_down: AtomicBool,
}

impl MemorySubsystem {
    /// Start a registry sampling the real system, with its monitor running.
    pub fn init(config: MemoryConfig) -> Self {
        tracing::info!(
            memory_limit_mb = config.memory_limit_mb(),
            cache_limit_mb = config.cache_limit_mb(),
            "initializing memory subsystem"
        );
        Self::with_registry(ResourceRegistry::start(config))
    }

    /// Build the subsystem around an existing registry.
    pub fn with_registry(registry: Arc<ResourceRegistry>) -> Self {
        Self {
            caches: CacheManager::new(registry.clone()),
            registry,
            cleanup: ResourceCleanupManager::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Get the registry
    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    /// Get the cache manager
    pub fn caches(&self) -> &CacheManager {
        &self.caches
    }

    /// Get the cleanup manager
    pub fn cleanup(&self) -> &ResourceCleanupManager {
        &self.cleanup
    }

    /// Clear all caches, shut down the registry, then run cleanup handlers
    /// and delete temporary files. Only the first call has an effect.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        self.caches.clear_all();
        self.registry.shutdown();
        self.cleanup.cleanup_all();
        tracing::info!("memory subsystem shut down");
    }
}
