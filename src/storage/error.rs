//! Storage layer error types.

use crate::storage::disk::FileId;
use crate::storage::page::{PageId, SlotId};
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File already exists: {0}")]
    FileExists(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File is still open: {0}")]
    FileInUse(String),

    #[error("File handle is not open: {0}")]
    FileNotOpen(FileId),

    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("Invalid page size: expected {expected}, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },

    #[error("Page not found: {0}")]
    PageNotFound(PageId),

    #[error("Page {page_id} of file {file} is not in the buffer pool")]
    PageNotResident { file: FileId, page_id: PageId },

    #[error("Page {page_id} of file {file} is not pinned")]
    PageNotPinned { file: FileId, page_id: PageId },

    #[error("Buffer pool is full: every frame is pinned")]
    BufferPoolFull,

    #[error("Page is full: requires {required} bytes but only {available} available")]
    NoSpace { required: usize, available: usize },

    #[error("Record not found: slot {slot_id} on page {page_id} is empty or deleted")]
    RecordNotFound { page_id: PageId, slot_id: SlotId },

    #[error("Invalid slot ID: {slot_id} (slots on page: {slot_count})")]
    InvalidSlotId { slot_id: SlotId, slot_count: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
