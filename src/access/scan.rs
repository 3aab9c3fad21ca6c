//! Forward-only filtered scans over a heap file.

use crate::access::cursor::Position;
use crate::access::error::{HeapError, HeapResult};
use crate::access::heap::HeapFile;
use crate::access::predicate::{Datatype, Operator, ScanPredicate};
use crate::access::record::{Record, RecordId};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::error::StorageError;
use crate::storage::page::{HeapPage, PageId};
use parking_lot::{MappedRwLockWriteGuard, RwLockWriteGuard};

/// Outcome of one step within the current page.
enum Step {
    Record { rid: RecordId, matches: bool },
    PageDone { next: Option<PageId> },
}

/// Scan cursor over a heap file.
///
/// Walks the page chain one record at a time, holding at most the current
/// data page pinned, and yields the ids of records that satisfy the active
/// predicate. Without a predicate every record is yielded.
pub struct HeapFileScan {
    heap: HeapFile,
    predicate: Option<ScanPredicate>,
    mark: Option<Position>,
}

impl HeapFileScan {
    pub fn open(pool: &BufferPoolManager, name: &str) -> HeapResult<Self> {
        Ok(Self {
            heap: HeapFile::open(pool, name)?,
            predicate: None,
            mark: None,
        })
    }

    pub fn heap_file(&self) -> &HeapFile {
        &self.heap
    }

    pub fn predicate(&self) -> Option<&ScanPredicate> {
        self.predicate.as_ref()
    }

    /// Configure the scan filter. A `None` filter scans unconditionally.
    ///
    /// Invalid parameters fail with `BadScanParameter` and keep the
    /// previous filter. The cursor position is not affected.
    pub fn start_scan(
        &mut self,
        offset: usize,
        length: usize,
        datatype: Datatype,
        filter: Option<&[u8]>,
        operator: Operator,
    ) -> HeapResult<()> {
        let predicate = match filter {
            Some(filter) => Some(ScanPredicate::new(offset, length, datatype, filter, operator)?),
            None => None,
        };
        self.predicate = predicate;
        Ok(())
    }

    /// Advance to the next matching record. `Ok(None)` marks the end of
    /// the file and is returned again on every later call. Failing to pin
    /// the next page of the chain also ends the scan.
    pub fn scan_next(&mut self) -> HeapResult<Option<RecordId>> {
        loop {
            match self.heap.cursor.position() {
                Position::AtEnd => return Ok(None),
                Position::Unpositioned => match self.heap.first_page() {
                    Some(first) => self.heap.cursor.pin(&self.heap.pool, self.heap.file, first)?,
                    None => {
                        self.heap.cursor.finish()?;
                        return Ok(None);
                    }
                },
                Position::OnPage { .. } => match self.step_on_page()? {
                    Step::Record { rid, matches } => {
                        self.heap.cursor.set_rid(Some(rid));
                        if matches {
                            return Ok(Some(rid));
                        }
                    }
                    Step::PageDone { next: Some(next) } => {
                        // A broken link ends the scan instead of restarting it
                        if let Err(e) = self.heap.cursor.pin(&self.heap.pool, self.heap.file, next) {
                            self.heap.cursor.finish()?;
                            return Err(e);
                        }
                    }
                    Step::PageDone { next: None } => {
                        self.heap.cursor.finish()?;
                        return Ok(None);
                    }
                },
            }
        }
    }

    fn step_on_page(&self) -> HeapResult<Step> {
        let page = self.heap.cursor.page().ok_or(HeapError::NoCurrentRecord)?;
        let view = HeapPage::from_data(page.read());

        let slot = match self.heap.cursor.rid() {
            Some(rid) => view.next_record(rid.slot_id),
            None => view.first_record(),
        };

        match slot {
            Some(slot_id) => {
                let matches = match &self.predicate {
                    Some(predicate) => predicate.matches(view.get_record(slot_id)?),
                    None => true,
                };
                Ok(Step::Record {
                    rid: RecordId::new(page.page_id(), slot_id),
                    matches,
                })
            }
            None => Ok(Step::PageDone {
                next: view.next_page(),
            }),
        }
    }

    fn current_rid(&self) -> HeapResult<RecordId> {
        self.heap.cursor.rid().ok_or(HeapError::NoCurrentRecord)
    }

    /// Copy of the record the scan is positioned on. Does not move the
    /// cursor; the page stays pinned.
    pub fn current_record(&self) -> HeapResult<Record> {
        let rid = self.current_rid()?;
        let page = self.heap.cursor.page().ok_or(HeapError::NoCurrentRecord)?;
        let data = HeapPage::from_data(page.read())
            .get_record(rid.slot_id)?
            .to_vec();
        Ok(Record::new(rid, data))
    }

    /// In-place access to the current record's bytes. Follow changes with
    /// [`HeapFileScan::mark_dirty`] so they are written back.
    pub fn record_mut(&mut self) -> HeapResult<MappedRwLockWriteGuard<'_, [u8]>> {
        let rid = self.current_rid()?;
        let page = self.heap.cursor.page().ok_or(HeapError::NoCurrentRecord)?;

        RwLockWriteGuard::try_map(page.write(), |data| {
            HeapPage::from_data(data).into_record_mut(rid.slot_id).ok()
        })
        .map_err(|_| {
            StorageError::RecordNotFound {
                page_id: rid.page_id,
                slot_id: rid.slot_id,
            }
            .into()
        })
    }

    /// Delete the current record. The cursor stays where it is, so the
    /// next `scan_next` continues with the following record.
    pub fn delete_record(&mut self) -> HeapResult<()> {
        let rid = self.current_rid()?;
        {
            let page = self.heap.cursor.page().ok_or(HeapError::NoCurrentRecord)?;
            HeapPage::from_data(&mut *page.write()).delete_record(rid.slot_id)?;
        }
        self.heap.cursor.mark_dirty()?;
        self.heap
            .update_header(|header| header.set_record_count(header.record_count().saturating_sub(1)));
        Ok(())
    }

    /// Flag the current page as modified.
    pub fn mark_dirty(&mut self) -> HeapResult<()> {
        self.current_rid()?;
        self.heap.cursor.mark_dirty()
    }

    /// Remember the current position. Replaces any earlier mark.
    pub fn mark_scan(&mut self) {
        self.mark = Some(self.heap.cursor.position());
    }

    /// Go back to the position saved by the last `mark_scan`.
    pub fn reset_scan(&mut self) -> HeapResult<()> {
        let mark = self.mark.ok_or(HeapError::NoMark)?;
        self.heap.cursor.restore(&self.heap.pool, self.heap.file, mark)
    }

    /// Release the current page. The next `scan_next` starts over from the
    /// first page.
    pub fn end_scan(&mut self) -> HeapResult<()> {
        self.heap.cursor.release()
    }

    /// Fetch the record at `rid` and position the scan on it.
    pub fn get_record(&mut self, rid: RecordId) -> HeapResult<Record> {
        self.heap.get_record(rid)
    }

    pub fn close(self) -> HeapResult<()> {
        self.heap.close()
    }
}

impl Iterator for HeapFileScan {
    type Item = HeapResult<RecordId>;

    fn next(&mut self) -> Option<Self::Item> {
        self.scan_next().transpose()
    }
}
