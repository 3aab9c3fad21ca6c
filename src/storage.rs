//! Storage layer implementation for heapstore.
//!
//! This module provides the foundation for persistent data storage using a page-based
//! architecture. Key components:
//!
//! - **PageManager**: Reads and writes fixed-size (8KB) pages of one OS file
//! - **FileManager**: Creates, opens, closes and destroys named files in a data directory
//! - **BufferPoolManager**: Shared page cache with pin counts, dirty bits and LRU eviction
//! - **HeapPage**: Slotted page format for variable-length records, linked into chains
//! - **FileHeaderPage**: The metadata page at the start of every heap file

pub mod buffer;
pub mod disk;
pub mod error;
pub mod page;

pub use buffer::{BufferPoolConfig, BufferPoolManager, PinnedPage};
pub use disk::{FileId, FileManager, PageManager, PAGE_SIZE};
pub use error::{StorageError, StorageResult};
pub use page::{FileHeaderPage, HeapPage, PageId, SlotId};
