//! Eviction policies
//!
//! A policy orders cache entries from most to least evictable. Victim
//! selection is shared: non-critical entries are taken first in policy
//! order, and critical entries only once something has been selected and
//! the target is still unmet.

use std::fmt::Debug;
use std::time::Instant;

use color_picker_memory::Priority;
use serde::{Deserialize, Serialize};

/// Snapshot of one entry's bookkeeping, as seen by a policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryStats {
    pub size_bytes: u64,
    pub priority: Priority,
    pub created_at: Instant,
    pub last_accessed: Instant,
    pub access_count: u64,
    /// Cache-wide counter bumped on every insert and access; breaks ties
    /// between equal timestamps
    pub touch_seq: u64,
}

impl EntryStats {
    fn idle_secs(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.last_accessed).as_secs_f64()
    }

    fn age_secs(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.created_at).as_secs_f64()
    }
}

/// Strategy for choosing which cache entries to evict.
pub trait EvictionPolicy: Debug + Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Indices of `entries`, most evictable first.
    fn rank(&self, entries: &[EntryStats], now: Instant) -> Vec<usize>;

    /// Indices of the entries to evict to free at least `target_bytes`.
    ///
    /// May free less than the target when only critical entries remain.
    fn select_victims(&self, entries: &[EntryStats], target_bytes: u64, now: Instant) -> Vec<usize> {
        if target_bytes == 0 {
            return Vec::new();
        }

        let ranked = self.rank(entries, now);
        let mut victims = Vec::new();
        let mut deferred = Vec::new();
        let mut freed = 0u64;

        for index in ranked {
            if freed >= target_bytes {
                break;
            }
            if entries[index].priority.is_critical() {
                deferred.push(index);
                continue;
            }
            victims.push(index);
            freed += entries[index].size_bytes;
        }

        if freed > 0 {
            for index in deferred {
                if freed >= target_bytes {
                    break;
                }
                victims.push(index);
                freed += entries[index].size_bytes;
            }
        }

        victims
    }
}

/// Least recently used first.
#[derive(Debug, Clone, Copy, Default)]
pub struct LruPolicy;

impl EvictionPolicy for LruPolicy {
    fn name(&self) -> &'static str {
        "lru"
    }

    fn rank(&self, entries: &[EntryStats], _now: Instant) -> Vec<usize> {
        let mut order: Vec<usize> = (0..entries.len()).collect();
        order.sort_by_key(|&i| (entries[i].last_accessed, entries[i].touch_seq));
        order
    }
}

/// Least frequently used first, older accesses breaking ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct LfuPolicy;

impl EvictionPolicy for LfuPolicy {
    fn name(&self) -> &'static str {
        "lfu"
    }

    fn rank(&self, entries: &[EntryStats], _now: Instant) -> Vec<usize> {
        let mut order: Vec<usize> = (0..entries.len()).collect();
        order.sort_by_key(|&i| {
            (
                entries[i].access_count,
                entries[i].last_accessed,
                entries[i].touch_seq,
            )
        });
        order
    }
}

/// Weights of the adaptive score components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveWeights {
    /// Weight of idle time relative to entry age
    pub idle: f64,
    /// Weight of inverse access frequency
    pub frequency: f64,
    /// Weight of the priority rank
    pub priority: f64,
}

impl Default for AdaptiveWeights {
    fn default() -> Self {
        Self {
            idle: 0.4,
            frequency: 0.4,
            priority: 0.2,
        }
    }
}

/// Composite of recency, frequency and priority; highest score first.
///
/// `score = idle/max(1, age) * w_idle + 1/max(1, accesses) * w_freq +
/// rank * w_prio`, where `rank` runs from 1 (critical) to 4 (low).
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptivePolicy {
    weights: AdaptiveWeights,
}

impl AdaptivePolicy {
    /// Create a policy with custom weights.
    pub fn new(weights: AdaptiveWeights) -> Self {
        Self { weights }
    }

    /// Get the weights
    pub fn weights(&self) -> AdaptiveWeights {
        self.weights
    }

    /// Score of one entry; higher is evicted sooner.
    pub fn score(&self, entry: &EntryStats, now: Instant) -> f64 {
        let idle = entry.idle_secs(now) / entry.age_secs(now).max(1.0);
        let inverse_frequency = 1.0 / entry.access_count.max(1) as f64;
        let rank = f64::from(entry.priority.eviction_rank());

        idle * self.weights.idle
            + inverse_frequency * self.weights.frequency
            + rank * self.weights.priority
    }
}

impl EvictionPolicy for AdaptivePolicy {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn rank(&self, entries: &[EntryStats], now: Instant) -> Vec<usize> {
        let scores: Vec<f64> = entries.iter().map(|entry| self.score(entry, now)).collect();
        let mut order: Vec<usize> = (0..entries.len()).collect();
        // Descending score; older touches first on ties
        order.sort_by(|&a, &b| {
            scores[b]
                .total_cmp(&scores[a])
                .then(entries[a].touch_seq.cmp(&entries[b].touch_seq))
        });
        order
    }
}

/// Selectable eviction policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicyKind {
    Lru,
    Lfu,
    #[default]
    Adaptive,
}

impl EvictionPolicyKind {
    /// Build the policy. `weights` only apply to [`EvictionPolicyKind::Adaptive`].
    pub fn build(self, weights: AdaptiveWeights) -> Box<dyn EvictionPolicy> {
        match self {
            EvictionPolicyKind::Lru => Box::new(LruPolicy),
            EvictionPolicyKind::Lfu => Box::new(LfuPolicy),
            EvictionPolicyKind::Adaptive => Box::new(AdaptivePolicy::new(weights)),
        }
    }
}
