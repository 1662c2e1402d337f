//! Memory pressure levels
//!
//! Buckets the continuous pressure score of [`MemoryStats`](crate::MemoryStats)
//! into coarse levels that drive how aggressively caches shrink.

/// Memory pressure level derived from a pressure score (0.0 to 1.0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PressureLevel {
    /// Pressure is low (<= 0.5)
    Low,
    /// Pressure is moderate (0.5 - 0.6)
    Moderate,
    /// Pressure is high (0.6 - 0.8)
    High,
    /// Pressure is critical (> 0.8)
    Critical,
}

impl PressureLevel {
    /// Get the pressure level from a pressure score
    pub fn from_pressure(pressure: f64) -> Self {
        if pressure > 0.8 {
            PressureLevel::Critical
        } else if pressure > 0.6 {
            PressureLevel::High
        } else if pressure > 0.5 {
            PressureLevel::Moderate
        } else {
            PressureLevel::Low
        }
    }

    /// Returns true if pressure requires action (High or Critical)
    pub fn needs_eviction(&self) -> bool {
        matches!(self, PressureLevel::High | PressureLevel::Critical)
    }

    /// Fraction of its own bytes a cache should release on a memory warning
    pub fn reduction_fraction(&self) -> f64 {
        match self {
            PressureLevel::Critical => 0.5,
            PressureLevel::High => 0.25,
            PressureLevel::Moderate | PressureLevel::Low => 0.1,
        }
    }
}

/// Apply a fraction to a byte count, truncating toward zero.
pub fn fraction_of(bytes: u64, fraction: f64) -> u64 {
    (bytes as f64 * fraction.clamp(0.0, 1.0)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pressure_levels() {
        assert_eq!(PressureLevel::from_pressure(0.3), PressureLevel::Low);
        assert_eq!(PressureLevel::from_pressure(0.5), PressureLevel::Low);
        assert_eq!(PressureLevel::from_pressure(0.55), PressureLevel::Moderate);
        assert_eq!(PressureLevel::from_pressure(0.7), PressureLevel::High);
        assert_eq!(PressureLevel::from_pressure(0.8), PressureLevel::High);
        assert_eq!(PressureLevel::from_pressure(0.95), PressureLevel::Critical);
    }

    #[test]
    fn test_pressure_needs_eviction() {
        assert!(!PressureLevel::Low.needs_eviction());
        assert!(!PressureLevel::Moderate.needs_eviction());
        assert!(PressureLevel::High.needs_eviction());
        assert!(PressureLevel::Critical.needs_eviction());
    }

    #[test]
    fn test_reduction_fractions() {
        assert_eq!(PressureLevel::from_pressure(0.9).reduction_fraction(), 0.5);
        assert_eq!(PressureLevel::from_pressure(0.7).reduction_fraction(), 0.25);
        assert_eq!(PressureLevel::from_pressure(0.2).reduction_fraction(), 0.1);
    }

    #[test]
    fn test_fraction_of() {
        assert_eq!(fraction_of(1000, 0.25), 250);
        assert_eq!(fraction_of(1000, 0.3), 300);
        assert_eq!(fraction_of(3, 0.5), 1);
        assert_eq!(fraction_of(1000, 2.0), 1000);
    }
}
