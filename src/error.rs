//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
///
/// Only construction and resizing can fail. Lookups and removals report
/// absence through `Option`/`bool` instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Capacity (or another construction parameter) is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The cache was built outside a Tokio runtime, so its expiration task
    /// has nowhere to run
    #[error("No Tokio runtime available to drive entry expiration")]
    NoRuntime,
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::InvalidConfiguration("capacity must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid configuration: capacity must be positive"
        );
        assert!(CacheError::NoRuntime.to_string().contains("Tokio runtime"));
    }
}
