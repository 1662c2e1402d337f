//! Non-owning liveness checks for registered resources.
//!
//! The registry never owns the data it tracks. An owner can attach a
//! [`Liveness`] check to a registration; once the check reports the owner
//! gone, the descriptor is reclaimed on the next sweep.

use std::sync::{Arc, Weak};

/// Reports whether the owner of a resource still exists.
pub trait Liveness: Send + Sync {
    /// Returns false once the owner has been dropped.
    fn is_alive(&self) -> bool;
}

impl<T: ?Sized + Send + Sync> Liveness for Weak<T> {
    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }
}

/// Token held by the owner of a resource.
///
/// Dropping the token (usually by dropping the struct that contains it)
/// makes every [`watch`](OwnerToken::watch) handle report dead.
#[derive(Debug, Default)]
pub struct OwnerToken(Arc<()>);

impl OwnerToken {
    /// Create a new live token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-owning handle that reports whether this token still exists.
    pub fn watch(&self) -> Weak<()> {
        Arc::downgrade(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_watch_follows_drop() {
        let token = OwnerToken::new();
        let watch = token.watch();
        assert!(watch.is_alive());

        drop(token);
        assert!(!watch.is_alive());
    }

    #[test]
    fn test_weak_to_arbitrary_value() {
        let value = Arc::new(vec![1u8, 2, 3]);
        let weak = Arc::downgrade(&value);
        assert!(Liveness::is_alive(&weak));

        drop(value);
        assert!(!Liveness::is_alive(&weak));
    }
}
