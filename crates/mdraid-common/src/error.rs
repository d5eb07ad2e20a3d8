//! Error types for mdraid
//!
//! This module defines the common error type used by the cache, the I/O
//! engine and the transports.

use thiserror::Error;

/// Common result type for mdraid operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for mdraid
#[derive(Debug, Error)]
pub enum Error {
    // Lifecycle errors
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    // Argument range errors
    #[error("invalid cache capacity {capacity}: must be within {min}..={max}")]
    InvalidCapacity {
        capacity: usize,
        min: usize,
        max: usize,
    },

    #[error("invalid block key: disk {disk}, block {block}")]
    InvalidKey { disk: u32, block: u32 },

    // Session errors
    #[error("array is not mounted")]
    NotMounted,

    #[error("write permission has not been granted")]
    NoWritePermission,

    // Request validation errors
    #[error("request length {len} exceeds the {max}-byte limit")]
    LengthTooLarge { len: u32, max: u32 },

    #[error("range {addr}+{len} exceeds array capacity {capacity}")]
    OutOfRange { addr: u32, len: u32, capacity: u64 },

    #[error("buffer holds {actual} bytes, request needs {required}")]
    InvalidBuffer { required: usize, actual: usize },

    // Transport errors
    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create an already exists error
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    /// Create a transport failure
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::TransportFailure(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Check if this is a retryable error
    ///
    /// Only transport-level failures qualify; the caller retries the whole
    /// logical operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportFailure(_) | Self::Io(_))
    }

    /// Check if this error was raised before any primitive was issued
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotMounted
                | Self::NoWritePermission
                | Self::LengthTooLarge { .. }
                | Self::OutOfRange { .. }
                | Self::InvalidBuffer { .. }
                | Self::InvalidKey { .. }
                | Self::InvalidCapacity { .. }
        )
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(Error::transport("connection reset").is_retryable());
        assert!(Error::Io(std::io::Error::other("broken pipe")).is_retryable());
        assert!(!Error::NotMounted.is_retryable());
        assert!(!Error::protocol("short frame").is_retryable());
    }

    #[test]
    fn test_error_validation() {
        assert!(Error::NotMounted.is_validation());
        assert!(Error::LengthTooLarge { len: 1025, max: 1024 }.is_validation());
        assert!(!Error::transport("down").is_validation());
        assert!(!Error::not_found("cache").is_validation());
    }

    #[test]
    fn test_error_display() {
        let err = Error::OutOfRange {
            addr: 1_048_570,
            len: 10,
            capacity: 1_048_576,
        };
        assert_eq!(
            err.to_string(),
            "range 1048570+10 exceeds array capacity 1048576"
        );
        assert!(Error::not_found("cache").is_not_found());
    }
}
