//! Color Picker Cache Library
//!
//! Generic in-memory caches with LRU, LFU and adaptive eviction, tracked by
//! the process-wide resource registry so they shrink under memory pressure.

pub mod cache;
pub mod config;
pub mod error;
pub mod manager;
pub mod persist;
pub mod policy;
pub mod size;
pub mod subsystem;

mod entry;

pub use cache::{CacheStats, IntelligentCache};
pub use config::CacheConfig;
pub use error::CacheError;
pub use manager::{AggregatedCacheStats, CacheManager, ManagedCache};
pub use persist::SNAPSHOT_VERSION;
pub use policy::{
    AdaptivePolicy, AdaptiveWeights, EntryStats, EvictionPolicy, EvictionPolicyKind, LfuPolicy,
    LruPolicy,
};
pub use size::{estimate_size, EstimateSize, DEFAULT_SIZE_ESTIMATE};
pub use subsystem::MemorySubsystem;
