//! Access layer for heap files.
//!
//! This module turns the paged storage layer into record-oriented files:
//!
//! - **HeapFile**: An open heap file with its header page pinned
//! - **HeapFileScan**: Forward-only scan with an optional single-attribute predicate
//! - **InsertFileScan**: Append path that grows the page chain on demand
//! - **ScanPredicate**: Typed comparison of a fixed byte range of each record
//!
//! Records are addressed by [`RecordId`], which stays valid across buffer
//! pool evictions until the record is deleted.

mod cursor;
pub mod error;
pub mod heap;
pub mod insert;
pub mod predicate;
pub mod record;
pub mod scan;

pub use cursor::Position;
pub use error::{HeapError, HeapResult};
pub use heap::{create_heap_file, destroy_heap_file, HeapFile};
pub use insert::InsertFileScan;
pub use predicate::{Datatype, Operator, ScanPredicate};
pub use record::{Record, RecordId};
pub use scan::HeapFileScan;
