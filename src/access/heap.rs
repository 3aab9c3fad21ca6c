//! Heap file lifecycle and the shared file handle.
//!
//! A heap file is a header page followed by a singly-linked chain of slotted
//! data pages. [`HeapFile`] keeps the header pinned for as long as the handle
//! lives and pins at most one data page at a time through its cursor.

use crate::access::cursor::Cursor;
use crate::access::error::{HeapError, HeapResult};
use crate::access::record::{Record, RecordId};
use crate::storage::buffer::{BufferPoolManager, PinnedPage};
use crate::storage::disk::FileId;
use crate::storage::error::StorageError;
use crate::storage::page::{FileHeaderPage, HeapPage, PageBuf, PageId};
use log::{debug, warn};
use parking_lot::RwLockReadGuard;

/// Create a heap file with an empty header and one empty data page.
///
/// If formatting fails part way the file is left on disk as it is.
pub fn create_heap_file(pool: &BufferPoolManager, name: &str) -> HeapResult<()> {
    let files = pool.files();

    match files.open_file(name) {
        Ok(file) => {
            files.close_file(file)?;
            return Err(HeapError::FileExists(name.to_string()));
        }
        Err(StorageError::FileNotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    files.create_file(name).map_err(|e| match e {
        StorageError::FileExists(name) => HeapError::FileExists(name),
        e => e.into(),
    })?;
    let file = files.open_file(name)?;

    let formatted = format_heap_file(pool, file, name);
    let flushed = pool.flush_file(file);
    let closed = files.close_file(file);
    formatted?;
    flushed?;
    closed?;

    debug!("created heap file {}", name);
    Ok(())
}

fn format_heap_file(pool: &BufferPoolManager, file: FileId, name: &str) -> HeapResult<()> {
    let (_header_id, mut header) = pool.alloc_page(file)?;
    FileHeaderPage::new(&mut *header.write(), name);
    header.mark_dirty();

    let (data_id, mut data) = pool.alloc_page(file)?;
    HeapPage::new(&mut *data.write(), data_id);
    data.mark_dirty();

    {
        let mut guard = header.write();
        let mut view = FileHeaderPage::from_data(&mut *guard);
        view.set_first_page(Some(data_id));
        view.set_last_page(Some(data_id));
        view.set_page_count(2);
    }

    data.unpin()?;
    header.unpin()?;
    Ok(())
}

/// Delete a heap file. Fails while any handle still has it open.
pub fn destroy_heap_file(pool: &BufferPoolManager, name: &str) -> HeapResult<()> {
    pool.files().destroy_file(name)?;
    debug!("destroyed heap file {}", name);
    Ok(())
}

/// An open heap file.
///
/// Dropping the handle releases every pin it holds, flushes the file and
/// closes it. Failures during that teardown are logged; use
/// [`HeapFile::close`] to observe them.
pub struct HeapFile {
    pub(crate) pool: BufferPoolManager,
    pub(crate) file: FileId,
    pub(crate) cursor: Cursor,
    name: String,
    header: PinnedPage,
    closed: bool,
}

impl HeapFile {
    /// Open `name`, pin its header and, if the chain is not empty, its
    /// first data page.
    pub fn open(pool: &BufferPoolManager, name: &str) -> HeapResult<Self> {
        Self::open_with(pool, name, true)
    }

    /// Open `name` with only the header pinned.
    pub(crate) fn open_unpositioned(pool: &BufferPoolManager, name: &str) -> HeapResult<Self> {
        Self::open_with(pool, name, false)
    }

    fn open_with(pool: &BufferPoolManager, name: &str, pin_first: bool) -> HeapResult<Self> {
        let file = pool.files().open_file(name)?;

        match Self::pin_pages(pool, file, name, pin_first) {
            Ok((header, cursor)) => {
                debug!("opened heap file {} as {}", name, file);
                Ok(Self {
                    pool: pool.clone(),
                    file,
                    cursor,
                    name: name.to_string(),
                    header,
                    closed: false,
                })
            }
            Err(e) => {
                if let Err(close_err) = pool.files().close_file(file) {
                    warn!("failed to close {} after open error: {}", name, close_err);
                }
                Err(e)
            }
        }
    }

    fn pin_pages(
        pool: &BufferPoolManager,
        file: FileId,
        name: &str,
        pin_first: bool,
    ) -> HeapResult<(PinnedPage, Cursor)> {
        let header_id = pool.files().first_page(file)?;
        let header = pool.read_page(file, header_id)?;

        let first_page = {
            let view = FileHeaderPage::from_data(header.read());
            if !view.is_valid() {
                return Err(HeapError::NotAHeapFile(name.to_string()));
            }
            view.first_page()
        };

        let mut cursor = Cursor::new();
        if let Some(first_page) = first_page.filter(|_| pin_first) {
            cursor.pin(pool, file, first_page)?;
        }
        Ok((header, cursor))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file_id(&self) -> FileId {
        self.file
    }

    pub fn pool(&self) -> &BufferPoolManager {
        &self.pool
    }

    pub fn record_count(&self) -> u32 {
        self.header().record_count()
    }

    /// Header page plus every data page in the chain.
    pub fn page_count(&self) -> u32 {
        self.header().page_count()
    }

    pub fn first_page(&self) -> Option<PageId> {
        self.header().first_page()
    }

    pub fn last_page(&self) -> Option<PageId> {
        self.header().last_page()
    }

    /// Fetch a copy of the record at `rid` and position the handle on it.
    ///
    /// The data page holding `rid` becomes the current page; the previous
    /// one is released first.
    pub fn get_record(&mut self, rid: RecordId) -> HeapResult<Record> {
        if rid.page_id == self.header.page_id() {
            return Err(StorageError::RecordNotFound {
                page_id: rid.page_id,
                slot_id: rid.slot_id,
            }
            .into());
        }

        self.cursor.pin(&self.pool, self.file, rid.page_id)?;
        let page = self.cursor.page().ok_or(HeapError::NoCurrentRecord)?;
        let data = HeapPage::from_data(page.read())
            .get_record(rid.slot_id)?
            .to_vec();

        self.cursor.set_rid(Some(rid));
        Ok(Record::new(rid, data))
    }

    pub(crate) fn header(&self) -> FileHeaderPage<RwLockReadGuard<'_, PageBuf>> {
        FileHeaderPage::from_data(self.header.read())
    }

    /// Modify the header and flag it for write-back.
    pub(crate) fn update_header<F>(&mut self, update: F)
    where
        F: FnOnce(&mut FileHeaderPage<&mut PageBuf>),
    {
        {
            let mut guard = self.header.write();
            let mut view = FileHeaderPage::from_data(&mut *guard);
            update(&mut view);
        }
        self.header.mark_dirty();
    }

    /// Release all pins, flush and close the file, reporting the first
    /// failure. Every step runs even if an earlier one failed.
    pub fn close(mut self) -> HeapResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> HeapResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut result = Ok(());
        if let Err(e) = self.cursor.release() {
            warn!("failed to unpin current page of {}: {}", self.name, e);
            result = result.and(Err(e));
        }
        if let Err(e) = self.header.release() {
            warn!("failed to unpin header page of {}: {}", self.name, e);
            result = result.and(Err(e.into()));
        }
        if let Err(e) = self.pool.flush_file(self.file) {
            warn!("failed to flush {}: {}", self.name, e);
            result = result.and(Err(e.into()));
        }
        if let Err(e) = self.pool.files().close_file(self.file) {
            warn!("failed to close {}: {}", self.name, e);
            result = result.and(Err(e.into()));
        }

        debug!("closed heap file {}", self.name);
        result
    }
}

impl Drop for HeapFile {
    fn drop(&mut self) {
        // Failures were already logged by shutdown
        let _ = self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::buffer::BufferPoolConfig;
    use anyhow::Result;
    use tempfile::{tempdir, TempDir};

    fn create_pool() -> Result<(TempDir, BufferPoolManager)> {
        let dir = tempdir()?;
        let pool = BufferPoolManager::new(BufferPoolConfig {
            data_dir: dir.path().to_path_buf(),
            max_frames: 16,
        })?;
        Ok((dir, pool))
    }

    #[test]
    fn test_create_heap_file() -> Result<()> {
        let (_dir, pool) = create_pool()?;
        create_heap_file(&pool, "people")?;
        assert!(!pool.files().is_open("people"));

        let heap = HeapFile::open(&pool, "people")?;
        assert_eq!(heap.record_count(), 0);
        assert_eq!(heap.page_count(), 2);
        assert_eq!(heap.first_page(), Some(PageId(1)));
        assert_eq!(heap.first_page(), heap.last_page());
        assert_eq!(heap.header().file_name(), "people");

        // Header and first data page
        assert_eq!(pool.pin_count(heap.file_id()), 2);

        Ok(())
    }

    #[test]
    fn test_create_existing_file_fails() -> Result<()> {
        let (_dir, pool) = create_pool()?;
        create_heap_file(&pool, "people")?;

        assert!(matches!(
            create_heap_file(&pool, "people"),
            Err(HeapError::FileExists(_))
        ));
        assert!(!pool.files().is_open("people"));

        Ok(())
    }

    #[test]
    fn test_open_missing_file() -> Result<()> {
        let (_dir, pool) = create_pool()?;

        let result = HeapFile::open(&pool, "missing");
        assert!(matches!(
            result,
            Err(HeapError::Storage(StorageError::FileNotFound(_)))
        ));

        Ok(())
    }

    #[test]
    fn test_open_rejects_foreign_file() -> Result<()> {
        let (_dir, pool) = create_pool()?;
        pool.files().create_file("raw")?;
        let file = pool.files().open_file("raw")?;
        let (_page_id, page) = pool.alloc_page(file)?;
        page.unpin()?;
        pool.flush_file(file)?;
        pool.files().close_file(file)?;

        assert!(matches!(
            HeapFile::open(&pool, "raw"),
            Err(HeapError::NotAHeapFile(_))
        ));
        assert!(!pool.files().is_open("raw"));
        assert_eq!(pool.total_pins(), 0);

        Ok(())
    }

    #[test]
    fn test_open_empty_file_fails_and_closes() -> Result<()> {
        let (_dir, pool) = create_pool()?;
        pool.files().create_file("empty")?;

        assert!(matches!(
            HeapFile::open(&pool, "empty"),
            Err(HeapError::Storage(StorageError::PageNotFound(_)))
        ));
        assert!(!pool.files().is_open("empty"));

        Ok(())
    }

    #[test]
    fn test_open_empty_chain_pins_only_header() -> Result<()> {
        let (_dir, pool) = create_pool()?;
        pool.files().create_file("bare")?;
        let file = pool.files().open_file("bare")?;
        let (_page_id, mut page) = pool.alloc_page(file)?;
        FileHeaderPage::new(&mut *page.write(), "bare");
        page.mark_dirty();
        page.unpin()?;
        pool.flush_file(file)?;
        pool.files().close_file(file)?;

        let heap = HeapFile::open(&pool, "bare")?;
        assert_eq!(heap.page_count(), 1);
        assert_eq!(heap.first_page(), None);
        assert_eq!(pool.pin_count(heap.file_id()), 1);

        Ok(())
    }

    #[test]
    fn test_get_record() -> Result<()> {
        let (_dir, pool) = create_pool()?;
        create_heap_file(&pool, "people")?;
        let mut heap = HeapFile::open(&pool, "people")?;
        let first = heap.first_page().ok_or_else(|| anyhow::anyhow!("no data page"))?;

        // Place a record directly on the first data page
        let slot_id = {
            let mut page = pool.read_page(heap.file_id(), first)?;
            let slot_id = HeapPage::from_data(&mut *page.write()).insert_record(b"alice")?;
            page.mark_dirty();
            slot_id
        };

        let rid = RecordId::new(first, slot_id);
        let record = heap.get_record(rid)?;
        assert_eq!(record.data, b"alice");
        assert_eq!(heap.cursor.rid(), Some(rid));

        let missing = heap.get_record(RecordId::new(first, slot_id + 1));
        assert!(matches!(missing, Err(ref e) if e.is_record_not_found()));

        let header = heap.get_record(RecordId::new(PageId(0), 0));
        assert!(matches!(header, Err(ref e) if e.is_record_not_found()));

        Ok(())
    }

    #[test]
    fn test_get_record_on_missing_page_leaves_no_pin() -> Result<()> {
        let (_dir, pool) = create_pool()?;
        create_heap_file(&pool, "people")?;
        let mut heap = HeapFile::open(&pool, "people")?;

        assert!(heap.get_record(RecordId::new(PageId(42), 0)).is_err());
        // Only the header stays pinned
        assert_eq!(pool.pin_count(heap.file_id()), 1);

        Ok(())
    }

    #[test]
    fn test_drop_releases_everything() -> Result<()> {
        let (_dir, pool) = create_pool()?;
        create_heap_file(&pool, "people")?;

        {
            let mut heap = HeapFile::open(&pool, "people")?;
            heap.update_header(|header| header.set_record_count(7));
        }
        assert_eq!(pool.total_pins(), 0);
        assert!(!pool.files().is_open("people"));

        // Dirty header reached the file
        let heap = HeapFile::open(&pool, "people")?;
        assert_eq!(heap.record_count(), 7);
        heap.close()?;
        assert_eq!(pool.total_pins(), 0);

        Ok(())
    }

    #[test]
    fn test_close_finishes_after_unpin_failure() -> Result<()> {
        let (_dir, pool) = create_pool()?;
        create_heap_file(&pool, "people")?;

        let heap = HeapFile::open(&pool, "people")?;
        let file = heap.file_id();
        let first = heap.first_page().ok_or_else(|| anyhow::anyhow!("no data page"))?;

        // Take the current page's pin away so releasing it fails
        pool.unpin_page(file, first, false)?;

        let result = heap.close();
        assert!(matches!(
            result,
            Err(HeapError::Storage(StorageError::PageNotPinned { .. }))
        ));
        assert!(!pool.files().is_open("people"));
        assert_eq!(pool.total_pins(), 0);

        Ok(())
    }

    #[test]
    fn test_destroy_heap_file() -> Result<()> {
        let (_dir, pool) = create_pool()?;
        create_heap_file(&pool, "people")?;

        let heap = HeapFile::open(&pool, "people")?;
        assert!(matches!(
            destroy_heap_file(&pool, "people"),
            Err(HeapError::Storage(StorageError::FileInUse(_)))
        ));
        heap.close()?;

        destroy_heap_file(&pool, "people")?;
        assert!(matches!(
            HeapFile::open(&pool, "people"),
            Err(HeapError::Storage(StorageError::FileNotFound(_)))
        ));

        Ok(())
    }
}
