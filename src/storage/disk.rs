//! Disk access: page I/O on single files and the named file registry.

pub mod file_manager;
pub mod page_manager;

pub use file_manager::{FileId, FileManager};
pub use page_manager::{PageManager, PAGE_SIZE};
