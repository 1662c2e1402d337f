//! Cache entries

use std::time::Instant;

use color_picker_memory::{OwnerToken, Priority};

use crate::policy::EntryStats;

/// A cached value with its bookkeeping.
///
/// Owned by exactly one cache. The registry only holds a descriptor under
/// `registry_id`, tied to the entry's lifetime through `owner`.
#[derive(Debug)]
pub(crate) struct CacheEntry<V> {
    pub(crate) value: V,
    pub(crate) size_bytes: u64,
    pub(crate) priority: Priority,
    pub(crate) created_at: Instant,
    pub(crate) last_accessed: Instant,
    pub(crate) access_count: u64,
    pub(crate) touch_seq: u64,
    /// Per-cache insertion counter; a registry eviction only applies to the
    /// generation it was registered for
    pub(crate) generation: u64,
    pub(crate) registry_id: String,
    pub(crate) _owner: OwnerToken,
}

impl<V> CacheEntry<V> {
    pub(crate) fn touch(&mut self, now: Instant, seq: u64) {
        if now > self.last_accessed {
            self.last_accessed = now;
        }
        self.access_count += 1;
        self.touch_seq = seq;
    }

    pub(crate) fn stats(&self) -> EntryStats {
        EntryStats {
            size_bytes: self.size_bytes,
            priority: self.priority,
            created_at: self.created_at,
            last_accessed: self.last_accessed,
            access_count: self.access_count,
            touch_seq: self.touch_seq,
        }
    }
}
