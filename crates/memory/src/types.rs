//! Core types shared by the registry and the caches built on top of it.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Kind of resource tracked by the registry.
///
/// The registry keeps one lock per kind, so unrelated kinds never contend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Decoded images and thumbnails
    ImageCache,
    /// Converted color values
    ColorCache,
    /// Generated palettes
    PaletteCache,
    /// Rendered UI assets
    UiCache,
    /// Temporary files on disk
    TempFiles,
    /// Image analysis results
    AnalysisCache,
}

impl ResourceKind {
    /// Number of resource kinds.
    pub const COUNT: usize = 6;

    /// Every resource kind, in shard order.
    pub const ALL: [ResourceKind; Self::COUNT] = [
        ResourceKind::ImageCache,
        ResourceKind::ColorCache,
        ResourceKind::PaletteCache,
        ResourceKind::UiCache,
        ResourceKind::TempFiles,
        ResourceKind::AnalysisCache,
    ];

    /// Stable index of this kind, used to select its lock shard.
    pub fn index(self) -> usize {
        match self {
            ResourceKind::ImageCache => 0,
            ResourceKind::ColorCache => 1,
            ResourceKind::PaletteCache => 2,
            ResourceKind::UiCache => 3,
            ResourceKind::TempFiles => 4,
            ResourceKind::AnalysisCache => 5,
        }
    }

    /// Snake-case name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::ImageCache => "image_cache",
            ResourceKind::ColorCache => "color_cache",
            ResourceKind::PaletteCache => "palette_cache",
            ResourceKind::UiCache => "ui_cache",
            ResourceKind::TempFiles => "temp_files",
            ResourceKind::AnalysisCache => "analysis_cache",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retention priority of a resource.
///
/// Ordered `Critical > High > Normal > Low`. Lower priorities are evicted
/// first; `Critical` resources are only evicted by forced cleanup.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Nice to have, first to go
    Low,
    /// Standard cached data
    #[default]
    Normal,
    /// Important for responsiveness
    High,
    /// Essential for the application to function
    Critical,
}

impl Priority {
    /// Eviction urgency ordinal: `Critical = 1` up to `Low = 4`.
    ///
    /// Eviction scores grow with this value.
    pub fn eviction_rank(self) -> u32 {
        match self {
            Priority::Critical => 1,
            Priority::High => 2,
            Priority::Normal => 3,
            Priority::Low => 4,
        }
    }

    /// Returns true for the eviction-exempt tier.
    pub fn is_critical(self) -> bool {
        self == Priority::Critical
    }
}

/// Public snapshot of a registered resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInfo {
    /// Registry-unique identifier
    pub id: String,
    /// Kind of resource
    pub kind: ResourceKind,
    /// Retention priority
    pub priority: Priority,
    /// Estimated size in bytes
    pub size_bytes: u64,
    /// When the resource was registered
    pub created_at: Instant,
    /// When the resource was last accessed
    pub last_accessed: Instant,
    /// Number of recorded accesses
    pub access_count: u64,
}

/// Memory usage statistics sampled from the system and the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryStats {
    /// Total system memory (bytes)
    pub total_memory: u64,
    /// Available system memory (bytes)
    pub available_memory: u64,
    /// Resident memory of this process (bytes)
    pub process_memory: u64,
    /// Process resident memory as a percentage of total memory
    pub memory_percent: f64,
    /// Bytes tracked by the registry
    pub cached_memory: u64,
}

impl MemoryStats {
    /// System-wide pressure: `1 - available / total`.
    pub fn system_pressure(&self) -> f64 {
        if self.total_memory == 0 {
            return 0.0;
        }
        1.0 - (self.available_memory as f64 / self.total_memory as f64)
    }

    /// Process pressure: `memory_percent / 100`.
    pub fn process_pressure(&self) -> f64 {
        self.memory_percent / 100.0
    }

    /// Combined pressure in `[0, 1]`, the larger of system and process pressure.
    pub fn pressure(&self) -> f64 {
        if self.total_memory == 0 {
            return 0.0;
        }
        self.system_pressure()
            .max(self.process_pressure())
            .clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_indices_are_unique() {
        for (i, kind) in ResourceKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ResourceKind::ImageCache.to_string(), "image_cache");
        assert_eq!(ResourceKind::AnalysisCache.to_string(), "analysis_cache");
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_eviction_rank() {
        assert_eq!(Priority::Critical.eviction_rank(), 1);
        assert_eq!(Priority::High.eviction_rank(), 2);
        assert_eq!(Priority::Normal.eviction_rank(), 3);
        assert_eq!(Priority::Low.eviction_rank(), 4);
    }

    #[test]
    fn test_pressure_formula() {
        let stats = MemoryStats {
            total_memory: 1000,
            available_memory: 200,
            process_memory: 150,
            memory_percent: 15.0,
            cached_memory: 0,
        };

        assert!((stats.system_pressure() - 0.8).abs() < 1e-9);
        assert!((stats.process_pressure() - 0.15).abs() < 1e-9);
        assert!((stats.pressure() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_process_pressure_dominates() {
        let stats = MemoryStats {
            total_memory: 1000,
            available_memory: 900,
            process_memory: 500,
            memory_percent: 50.0,
            cached_memory: 0,
        };
        assert!((stats.pressure() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_zeroed_stats_have_no_pressure() {
        assert_eq!(MemoryStats::default().pressure(), 0.0);
    }
}
