//! Observer interface for memory warnings and cleanup notifications.

use crate::{MemoryStats, ResourceKind};

/// Receives notifications from the registry.
///
/// Methods are called synchronously from whichever thread triggered the
/// event, often the monitor thread, and must not block. Panics are caught
/// and ignored by the registry.
pub trait MemoryObserver: Send + Sync {
    /// Memory pressure crossed the cleanup threshold.
    fn on_memory_warning(&self, _stats: &MemoryStats) {}

    /// The registry evicted `bytes` of a resource of `kind`.
    fn on_cleanup(&self, _kind: ResourceKind, _bytes: u64) {}

    /// Returns false once the observer should be dropped from the registry.
    fn is_active(&self) -> bool {
        true
    }
}

/// Adapts a closure into a memory-warning observer.
pub(crate) struct WarningFn<F>(pub(crate) F);

impl<F> MemoryObserver for WarningFn<F>
where
    F: Fn(&MemoryStats) + Send + Sync,
{
    fn on_memory_warning(&self, stats: &MemoryStats) {
        (self.0)(stats)
    }
}

/// Adapts a closure into a cleanup observer.
pub(crate) struct CleanupFn<F>(pub(crate) F);

impl<F> MemoryObserver for CleanupFn<F>
where
    F: Fn(ResourceKind, u64) + Send + Sync,
{
    fn on_cleanup(&self, kind: ResourceKind, bytes: u64) {
        (self.0)(kind, bytes)
    }
}
