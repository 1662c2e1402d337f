//! Per-cache configuration.

use std::path::{Path, PathBuf};

use color_picker_memory::ResourceKind;
use serde::{Deserialize, Serialize};

use crate::policy::{AdaptiveWeights, EvictionPolicyKind};

const MB: u64 = 1024 * 1024;

/// Configuration of one [`IntelligentCache`](crate::IntelligentCache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Size limit in bytes
    pub max_size_bytes: u64,
    /// Entry count limit
    pub max_entries: usize,
    /// Kind under which entries are registered
    pub resource_kind: ResourceKind,
    /// Eviction policy
    pub eviction_policy: EvictionPolicyKind,
    /// Weights of the adaptive policy
    pub adaptive_weights: AdaptiveWeights,
    /// Snapshot file; persistence is disabled when unset
    pub persistence_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 64 * MB,
            max_entries: 1000,
            resource_kind: ResourceKind::ImageCache,
            eviction_policy: EvictionPolicyKind::Adaptive,
            adaptive_weights: AdaptiveWeights::default(),
            persistence_path: None,
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with the given limits.
    ///
    /// # Arguments
    /// * `max_size_mb` - Size limit in megabytes
    /// * `max_entries` - Entry count limit
    pub fn new(max_size_mb: u64, max_entries: usize) -> Self {
        Self {
            max_size_bytes: max_size_mb * MB,
            max_entries,
            ..Self::default()
        }
    }

    /// Sets the size limit in megabytes.
    pub fn with_max_size_mb(mut self, mb: u64) -> Self {
        self.max_size_bytes = mb * MB;
        self
    }

    /// Sets the size limit in bytes.
    pub fn with_max_size_bytes(mut self, bytes: u64) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    /// Sets the entry count limit.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Sets the resource kind entries are registered under.
    pub fn with_resource_kind(mut self, kind: ResourceKind) -> Self {
        self.resource_kind = kind;
        self
    }

    /// Sets the eviction policy.
    pub fn with_eviction_policy(mut self, policy: EvictionPolicyKind) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Sets the adaptive policy weights.
    pub fn with_adaptive_weights(mut self, weights: AdaptiveWeights) -> Self {
        self.adaptive_weights = weights;
        self
    }

    /// Enables persistence to the given snapshot file.
    pub fn with_persistence_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.persistence_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables persistence to `<default dir>/<name>.json`.
    pub fn with_default_persistence(self, name: &str) -> Self {
        let path = Self::default_persistence_dir().join(format!("{}.json", name));
        self.with_persistence_path(path)
    }

    /// Returns the default snapshot directory for the current platform.
    ///
    /// - macOS: ~/Library/Caches/enhanced-color-picker/caches
    /// - Linux: ~/.cache/enhanced-color-picker/caches
    /// - Windows: %LOCALAPPDATA%\enhanced-color-picker\caches
    pub fn default_persistence_dir() -> PathBuf {
        if let Some(cache_dir) = dirs::cache_dir() {
            cache_dir.join("enhanced-color-picker").join("caches")
        } else {
            // Fallback to current directory if cache dir unavailable
            PathBuf::from("cache/caches")
        }
    }

    /// Returns the size limit in megabytes.
    pub fn max_size_mb(&self) -> u64 {
        self.max_size_bytes / MB
    }
}
