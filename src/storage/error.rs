//! Storage layer error types.

use crate::storage::page::PageId;
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid page: {0} does not exist")]
    InvalidPage(PageId),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Allocation exhausted: backend cannot produce a new page id")]
    AllocationExhausted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Error code reserved for "no error" in the error-slot convention.
    pub const NO_ERROR: i32 = 0;
    pub const INVALID_PAGE: i32 = 1;
    pub const ILLEGAL_STATE: i32 = 2;
    pub const ALLOCATION_EXHAUSTED: i32 = 3;

    pub fn unavailable(msg: impl Into<String>) -> Self {
        StorageError::BackendUnavailable(msg.into())
    }

    /// Whether the error leaves the backend unusable for the rest of the session.
    ///
    /// `InvalidPage` and `AllocationExhausted` only fail the call that raised them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StorageError::BackendUnavailable(_)
                | StorageError::Io(_)
                | StorageError::Serialization(_)
        )
    }

    /// Numeric code for engines that read errors out of an error slot.
    pub fn code(&self) -> i32 {
        match self {
            StorageError::InvalidPage(_) => Self::INVALID_PAGE,
            StorageError::AllocationExhausted => Self::ALLOCATION_EXHAUSTED,
            StorageError::BackendUnavailable(_)
            | StorageError::Io(_)
            | StorageError::Serialization(_) => Self::ILLEGAL_STATE,
        }
    }
}

impl From<bincode::Error> for StorageError {
    fn from(e: bincode::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
