//! Error types for the cache crate.

use std::io;

use thiserror::Error;

/// Errors from typed cache lookups and snapshot persistence.
///
/// Cache reads and writes themselves never fail.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A cache with this name exists with different key or value types
    #[error("cache '{name}' exists with different key or value types")]
    TypeMismatch { name: String },

    /// The cache has no persistence path configured
    #[error("cache '{name}' has no persistence path")]
    PersistenceDisabled { name: String },

    /// The snapshot was written by an incompatible version
    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedSnapshot { found: u32, expected: u32 },

    /// Snapshot file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Snapshot encoding or decoding failed
    #[error("snapshot serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
