//! Size estimation for cached values
//!
//! Sizes are estimates used for budgeting, not exact heap accounting.

use std::mem;
use std::sync::Arc;

/// Size charged for values whose footprint cannot be probed.
pub const DEFAULT_SIZE_ESTIMATE: u64 = 1024;

/// Values that can report an approximate memory footprint.
///
/// Implement [`estimated_size`](EstimateSize::estimated_size) for types
/// that own heap data. An empty `impl EstimateSize for MyType {}` falls back
/// to the inline size of the value.
///
/// # Example
///
/// ```
/// use color_picker_cache::{estimate_size, EstimateSize};
///
/// struct Swatch {
///     rgba: Vec<u8>,
/// }
///
/// impl EstimateSize for Swatch {
///     fn estimated_size(&self) -> Option<u64> {
///         Some(self.rgba.len() as u64)
///     }
/// }
///
/// assert_eq!(estimate_size(&Swatch { rgba: vec![0; 64] }), 64);
/// ```
pub trait EstimateSize {
    /// Approximate size in bytes, or `None` to probe the inline size.
    fn estimated_size(&self) -> Option<u64> {
        None
    }
}

/// Estimate the size of `value` in bytes.
///
/// Uses the value's own estimate, then its inline size, then
/// [`DEFAULT_SIZE_ESTIMATE`] for zero-sized values.
pub fn estimate_size<V: EstimateSize + ?Sized>(value: &V) -> u64 {
    value.estimated_size().unwrap_or_else(|| match mem::size_of_val(value) {
        0 => DEFAULT_SIZE_ESTIMATE,
        inline => inline as u64,
    })
}

macro_rules! inline_size {
    ($($ty:ty),* $(,)?) => {
        $(impl EstimateSize for $ty {})*
    };
}

inline_size!(
    bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, ()
);

impl EstimateSize for String {
    fn estimated_size(&self) -> Option<u64> {
        Some((mem::size_of::<String>() + self.capacity()) as u64)
    }
}

impl EstimateSize for str {
    fn estimated_size(&self) -> Option<u64> {
        Some(self.len() as u64)
    }
}

impl<T> EstimateSize for Vec<T> {
    fn estimated_size(&self) -> Option<u64> {
        Some((mem::size_of::<Vec<T>>() + self.capacity() * mem::size_of::<T>()) as u64)
    }
}

impl<T> EstimateSize for [T] {
    fn estimated_size(&self) -> Option<u64> {
        Some(mem::size_of_val(self) as u64)
    }
}

impl<T: EstimateSize + ?Sized> EstimateSize for Box<T> {
    fn estimated_size(&self) -> Option<u64> {
        Some(estimate_size(&**self))
    }
}

impl<T: EstimateSize + ?Sized> EstimateSize for Arc<T> {
    fn estimated_size(&self) -> Option<u64> {
        Some(estimate_size(&**self))
    }
}

impl<T: EstimateSize> EstimateSize for Option<T> {
    fn estimated_size(&self) -> Option<u64> {
        match self {
            Some(value) => Some(estimate_size(value)),
            None => Some(mem::size_of::<Self>() as u64),
        }
    }
}

impl<A: EstimateSize, B: EstimateSize> EstimateSize for (A, B) {
    fn estimated_size(&self) -> Option<u64> {
        Some(estimate_size(&self.0) + estimate_size(&self.1))
    }
}

impl<T: EstimateSize, const N: usize> EstimateSize for [T; N] {
    fn estimated_size(&self) -> Option<u64> {
        Some(self.iter().map(estimate_size).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Opaque;
    impl EstimateSize for Opaque {}

    struct Probed {
        _rgb: [u8; 3],
        _alpha: f32,
    }
    impl EstimateSize for Probed {}

    #[test]
    fn test_explicit_estimate() {
        let pixels = Vec::<u32>::with_capacity(16);
        assert_eq!(
            estimate_size(&pixels),
            (mem::size_of::<Vec<u32>>() + 64) as u64
        );
        assert_eq!(estimate_size("abc"), 3);
    }

    #[test]
    fn test_probe_and_default() {
        assert_eq!(estimate_size(&7u64), 8);
        assert_eq!(estimate_size(&Probed { _rgb: [0; 3], _alpha: 1.0 }), mem::size_of::<Probed>() as u64);
        assert_eq!(estimate_size(&Opaque), DEFAULT_SIZE_ESTIMATE);
        assert_eq!(estimate_size(&()), DEFAULT_SIZE_ESTIMATE);
    }

    #[test]
    fn test_wrappers_delegate() {
        let shared = Arc::new(vec![0u8; 100]);
        assert_eq!(estimate_size(&shared), estimate_size(&*shared));

        let pair = (1u32, [0u16; 4]);
        assert_eq!(estimate_size(&pair), 4 + 8);
    }
}
