//! Error types for the simcache library.
//!
//! ## Key Components
//!
//! - [`CacheError`]: Returned by cache operations. Every variant aborts the
//!   operation before any structural mutation.
//! - [`InvariantError`]: Returned when internal data-structure invariants are
//!   violated (`check_invariants` methods).
//! - [`ConfigError`]: Returned when cache configuration parameters are invalid
//!   (e.g. zero capacity, LIR set larger than the cache).
//!
//! ## Severity
//!
//! | Variant                | Caller reaction                          |
//! |------------------------|------------------------------------------|
//! | `ProtocolViolation`    | fix the calling code; cache unchanged    |
//! | `StorageInconsistency` | treat the file as absent and continue    |
//! | `EvictionExhausted`    | logged only; the structure grows         |
//! | `FatalConfiguration`   | terminate the process                    |
//! | `CapacityExhausted`    | terminate the process                    |
//!
//! ## Example Usage
//!
//! ```
//! use simcache::error::CacheError;
//!
//! let err = CacheError::protocol("a.nc", "refresh on unknown key");
//! assert!(!err.is_fatal());
//! assert!(err.to_string().contains("a.nc"));
//! ```

use thiserror::Error;

/// Result alias used by all cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Failure of a cache operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The caller broke the put/get/refresh contract (double put, refresh on
    /// an unknown key, key found in two structures).
    #[error("protocol violation for key `{key}`: {reason}")]
    ProtocolViolation { key: String, reason: String },

    /// Metadata claims a file is available but storage disagrees.
    #[error("storage inconsistency for key `{key}`: {reason}")]
    StorageInconsistency { key: String, reason: String },

    /// No unpinned victim exists. Never returned by the policies; they log it
    /// and let the structure grow.
    #[error("no evictable entry in {structure} (declared capacity {capacity})")]
    EvictionExhausted {
        structure: &'static str,
        capacity: usize,
    },

    /// A policy invariant that guarantees a victim was violated.
    #[error("fatal cache configuration: {0}")]
    FatalConfiguration(String),

    /// The slot-id space of an ordered map is used up.
    #[error("ordered map slot space exhausted at {limit} slots")]
    CapacityExhausted { limit: usize },
}

impl CacheError {
    /// Builds a [`CacheError::ProtocolViolation`].
    pub fn protocol(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Builds a [`CacheError::StorageInconsistency`].
    pub fn storage(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StorageInconsistency {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if serving must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FatalConfiguration(_) | Self::CapacityExhausted { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal cache invariants are violated.
///
/// Produced by `check_invariants` methods on the ordered map and on every
/// policy. Carries a human-readable description of which invariant failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when cache configuration parameters are invalid.
///
/// Produced by [`CacheConfig::validate`](crate::config::CacheConfig::validate)
/// and the policy constructors.
///
/// # Example
///
/// ```
/// use simcache::config::CacheConfig;
///
/// let config = CacheConfig { capacity: 0, ..CacheConfig::default() };
/// let err = config.validate().unwrap_err();
/// assert!(err.to_string().contains("capacity"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- CacheError -------------------------------------------------------

    #[test]
    fn protocol_display_names_key_and_reason() {
        let err = CacheError::protocol("out_0001.nc", "key already present");
        let text = err.to_string();
        assert!(text.contains("out_0001.nc"));
        assert!(text.contains("already present"));
    }

    #[test]
    fn only_fatal_variants_are_fatal() {
        assert!(CacheError::FatalConfiguration("lir".into()).is_fatal());
        assert!(CacheError::CapacityExhausted { limit: 4 }.is_fatal());
        assert!(!CacheError::protocol("k", "r").is_fatal());
        assert!(!CacheError::storage("k", "r").is_fatal());
        assert!(
            !CacheError::EvictionExhausted {
                structure: "LRU",
                capacity: 3
            }
            .is_fatal()
        );
    }

    #[test]
    fn eviction_exhausted_mentions_capacity() {
        let err = CacheError::EvictionExhausted {
            structure: "T1",
            capacity: 8,
        };
        assert!(err.to_string().contains('8'));
        assert!(err.to_string().contains("T1"));
    }

    // -- InvariantError ---------------------------------------------------

    #[test]
    fn invariant_display_shows_message() {
        let err = InvariantError::new("queue length mismatch");
        assert_eq!(err.to_string(), "queue length mismatch");
        assert_eq!(err.message(), "queue length mismatch");
    }

    #[test]
    fn invariant_implements_std_error() {
        fn assert_error<T: std::error::Error>() {}
        assert_error::<InvariantError>();
    }

    // -- ConfigError ------------------------------------------------------

    #[test]
    fn config_display_shows_message() {
        let err = ConfigError::new("capacity must be > 0");
        assert_eq!(err.to_string(), "capacity must be > 0");
        assert_eq!(err.message(), "capacity must be > 0");
    }

    #[test]
    fn config_clone_and_eq() {
        let a = ConfigError::new("x");
        let b = a.clone();
        assert_eq!(a, b);
    }
}
