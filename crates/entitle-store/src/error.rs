//! Errors raised by store and cache implementations.

use entitle_types::EntitleError;
use thiserror::Error;

/// Failure of a durable store call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// An operation record with this token already exists. The coordinator
    /// treats this as the race case, never as a caller-visible error.
    #[error("operation record already exists for token {token}")]
    UniqueViolation { token: String },

    /// The store could not complete the call. Nothing was committed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for EntitleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { token } => EntitleError::Internal(format!(
                "unhandled uniqueness violation for token {token}"
            )),
            StoreError::Unavailable(reason) => EntitleError::StoreUnavailable(reason),
            StoreError::Corrupt(reason) => EntitleError::Internal(reason),
        }
    }
}

/// Failure of a cache call. Always non-fatal to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;
