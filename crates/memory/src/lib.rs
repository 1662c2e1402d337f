//! Color Picker Memory Library
//!
//! Process-wide registry of cached resources with memory-pressure monitoring
//! and priority-aware eviction.

pub mod cleanup;
pub mod config;
pub mod liveness;
pub mod observer;
pub mod pressure;
pub mod registry;
pub mod sampler;
pub mod types;

mod monitor;

pub use cleanup::ResourceCleanupManager;
pub use config::{ConfigError, MemoryConfig, MIN_MONITOR_INTERVAL};
pub use liveness::{Liveness, OwnerToken};
pub use observer::MemoryObserver;
pub use pressure::{fraction_of, PressureLevel};
pub use registry::{
    CleanupAction, CleanupRequest, ForceCleanupReport, KindSummary, MonitorReport,
    OptimizationReport, Recommendation, Registration, ResourceRegistry,
};
pub use sampler::{ManualSampler, MemorySample, MemorySampler, SystemSampler};
pub use types::{MemoryStats, Priority, ResourceInfo, ResourceKind};
