//! Append-only insertion into a heap file.

use crate::access::error::{HeapError, HeapResult};
use crate::access::heap::HeapFile;
use crate::access::record::RecordId;
use crate::storage::buffer::BufferPoolManager;
use crate::storage::error::StorageError;
use crate::storage::page::{HeapPage, MAX_RECORD_SIZE};
use log::debug;

/// Insert cursor over a heap file.
///
/// Records are appended to the last page of the chain; a new page is linked
/// in when it is full. Each call pins the tail page itself and releases it
/// again before returning, so no data page stays pinned between calls.
pub struct InsertFileScan {
    heap: HeapFile,
}

impl InsertFileScan {
    pub fn open(pool: &BufferPoolManager, name: &str) -> HeapResult<Self> {
        Ok(Self {
            heap: HeapFile::open_unpositioned(pool, name)?,
        })
    }

    pub fn heap_file(&self) -> &HeapFile {
        &self.heap
    }

    pub fn insert_record(&mut self, record: &[u8]) -> HeapResult<RecordId> {
        if record.len() > MAX_RECORD_SIZE {
            return Err(HeapError::InvalidRecordLength {
                length: record.len(),
                max: MAX_RECORD_SIZE,
            });
        }

        let inserted = self.append(record);
        let released = self.heap.cursor.release();
        let rid = inserted?;
        released?;
        Ok(rid)
    }

    fn append(&mut self, record: &[u8]) -> HeapResult<RecordId> {
        if !self.heap.cursor.is_pinned() {
            match self.heap.last_page() {
                Some(last) => self.heap.cursor.pin(&self.heap.pool, self.heap.file, last)?,
                None => self.extend_chain()?,
            }
        }

        let rid = match self.insert_on_current(record) {
            Err(HeapError::Storage(StorageError::NoSpace { .. })) => {
                self.extend_chain()?;
                self.insert_on_current(record)?
            }
            other => other?,
        };

        self.heap.cursor.mark_dirty()?;
        self.heap
            .update_header(|header| header.set_record_count(header.record_count() + 1));
        Ok(rid)
    }

    fn insert_on_current(&self, record: &[u8]) -> HeapResult<RecordId> {
        let page = self.heap.cursor.page().ok_or(HeapError::NoCurrentRecord)?;
        let slot_id = HeapPage::from_data(&mut *page.write()).insert_record(record)?;
        Ok(RecordId::new(page.page_id(), slot_id))
    }

    /// Allocate a page, link it after the current tail and make it current.
    /// With nothing pinned the chain is empty and the page becomes its head.
    fn extend_chain(&mut self) -> HeapResult<()> {
        let (page_id, mut page) = self.heap.pool.alloc_page(self.heap.file)?;
        HeapPage::new(&mut *page.write(), page_id);
        page.mark_dirty();

        let chain_was_empty = match self.heap.cursor.page() {
            Some(tail) => {
                HeapPage::from_data(&mut *tail.write()).set_next_page(Some(page_id));
                false
            }
            None => true,
        };
        if !chain_was_empty {
            self.heap.cursor.mark_dirty()?;
        }

        self.heap.update_header(|header| {
            if chain_was_empty {
                header.set_first_page(Some(page_id));
            }
            header.set_last_page(Some(page_id));
            header.set_page_count(header.page_count() + 1);
        });
        self.heap.cursor.adopt(page)?;

        debug!("linked page {} into {}", page_id, self.heap.name());
        Ok(())
    }

    pub fn close(self) -> HeapResult<()> {
        self.heap.close()
    }
}
