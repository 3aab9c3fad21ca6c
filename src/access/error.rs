//! Heap file error types.

use crate::storage::error::StorageError;
use thiserror::Error;

/// Errors reported by heap file handles and their cursors.
#[derive(Error, Debug)]
pub enum HeapError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Heap file already exists: {0}")]
    FileExists(String),

    #[error("Not a heap file: {0}")]
    NotAHeapFile(String),

    #[error("Bad scan parameter: {0}")]
    BadScanParameter(String),

    #[error("Invalid record length: {length} bytes (max: {max})")]
    InvalidRecordLength { length: usize, max: usize },

    #[error("Cursor is not positioned on a record")]
    NoCurrentRecord,

    #[error("No scan position has been marked")]
    NoMark,
}

impl HeapError {
    /// Whether the error means the addressed record does not exist.
    pub fn is_record_not_found(&self) -> bool {
        matches!(
            self,
            HeapError::Storage(
                StorageError::RecordNotFound { .. } | StorageError::InvalidSlotId { .. }
            )
        )
    }
}

/// Result type for heap file operations.
pub type HeapResult<T> = Result<T, HeapError>;
