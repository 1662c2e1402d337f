//! Platform memory sampling.
//!
//! The registry asks a [`MemorySampler`] for raw numbers on every monitor
//! tick. Sampling may fail; callers keep their last known stats when it does.

use std::sync::Arc;

use parking_lot::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Raw memory figures from one sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemorySample {
    /// Total system memory in bytes
    pub total: u64,
    /// Available system memory in bytes
    pub available: u64,
    /// Resident memory of this process in bytes
    pub process_resident: u64,
}

impl MemorySample {
    /// Process resident memory as a percentage of total memory.
    pub fn process_percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.process_resident as f64 / self.total as f64 * 100.0
        }
    }
}

/// Source of system and process memory figures.
pub trait MemorySampler: Send {
    /// Take a sample, or `None` if the platform query failed.
    fn sample(&mut self) -> Option<MemorySample>;
}

/// Sampler backed by `sysinfo`.
///
/// Keeps one `System` instance alive and refreshes only memory and the
/// current process on each call.
pub struct SystemSampler {
    system: System,
    pid: Option<Pid>,
}

impl SystemSampler {
    /// Create a sampler for the current process.
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(err) => {
                tracing::debug!(error = %err, "current pid unavailable; process memory will read as zero");
                None
            }
        };

        Self {
            system: System::new(),
            pid,
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for SystemSampler {
    fn sample(&mut self) -> Option<MemorySample> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return None;
        }

        let process_resident = match self.pid {
            Some(pid) => {
                self.system.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[pid]),
                    true,
                    ProcessRefreshKind::nothing().with_memory(),
                );
                self.system.process(pid).map(|p| p.memory()).unwrap_or(0)
            }
            None => 0,
        };

        Some(MemorySample {
            total,
            available: self.system.available_memory(),
            process_resident,
        })
    }
}

/// Sampler whose figures are set by hand.
///
/// Clones share the same reading, so a test or an embedding application can
/// keep one handle and pass the other to the registry.
#[derive(Debug, Clone, Default)]
pub struct ManualSampler {
    reading: Arc<Mutex<Option<MemorySample>>>,
}

impl ManualSampler {
    /// Create a sampler that reports `sample`.
    pub fn new(sample: MemorySample) -> Self {
        Self {
            reading: Arc::new(Mutex::new(Some(sample))),
        }
    }

    /// Create a sampler whose queries fail until [`set`](Self::set) is called.
    pub fn failing() -> Self {
        Self::default()
    }

    /// Replace the reported figures.
    pub fn set(&self, sample: MemorySample) {
        *self.reading.lock() = Some(sample);
    }

    /// Make subsequent queries fail.
    pub fn fail(&self) {
        *self.reading.lock() = None;
    }
}

impl MemorySampler for ManualSampler {
    fn sample(&mut self) -> Option<MemorySample> {
        *self.reading.lock()
    }
}
