use crate::access::error::{HeapError, HeapResult};
use crate::access::record::RecordId;
use crate::storage::buffer::{BufferPoolManager, PinnedPage};
use crate::storage::disk::FileId;
use crate::storage::page::PageId;
use std::mem;

/// Pin-free snapshot of a cursor, as taken by `mark_scan`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Nothing pinned; the next scan step starts from the first data page.
    Unpositioned,
    /// On a data page, optionally at a record of that page. Without a
    /// record the next scan step yields the page's first record.
    OnPage {
        page_id: PageId,
        rid: Option<RecordId>,
    },
    /// Past the last record of the chain.
    AtEnd,
}

enum State {
    Unpositioned,
    OnPage {
        page: PinnedPage,
        rid: Option<RecordId>,
    },
    AtEnd,
}

/// The data page a handle holds pinned and the record it is positioned on.
///
/// Owns at most one pinned data page. Every transition that leaves a page
/// releases its pin with the dirty flag accumulated on it.
pub(crate) struct Cursor {
    state: State,
}

impl Cursor {
    pub fn new() -> Self {
        Self {
            state: State::Unpositioned,
        }
    }

    pub fn position(&self) -> Position {
        match &self.state {
            State::Unpositioned => Position::Unpositioned,
            State::OnPage { page, rid } => Position::OnPage {
                page_id: page.page_id(),
                rid: *rid,
            },
            State::AtEnd => Position::AtEnd,
        }
    }

    pub fn page(&self) -> Option<&PinnedPage> {
        match &self.state {
            State::OnPage { page, .. } => Some(page),
            _ => None,
        }
    }

    pub fn rid(&self) -> Option<RecordId> {
        match &self.state {
            State::OnPage { rid, .. } => *rid,
            _ => None,
        }
    }

    pub fn current_page_id(&self) -> Option<PageId> {
        self.page().map(PinnedPage::page_id)
    }

    pub fn is_pinned(&self) -> bool {
        matches!(self.state, State::OnPage { .. })
    }

    /// Make `page_id` the current page. Staying on the same page keeps the
    /// pin and the record position; moving releases the old pin first and
    /// leaves the cursor without a record. A failed pin leaves the cursor
    /// unpositioned with nothing pinned.
    pub fn pin(&mut self, pool: &BufferPoolManager, file: FileId, page_id: PageId) -> HeapResult<()> {
        if self.current_page_id() == Some(page_id) {
            return Ok(());
        }

        self.release()?;
        let page = pool.read_page(file, page_id)?;
        self.state = State::OnPage { page, rid: None };
        Ok(())
    }

    /// Take over a page the caller already holds pinned.
    pub fn adopt(&mut self, page: PinnedPage) -> HeapResult<()> {
        self.release()?;
        self.state = State::OnPage { page, rid: None };
        Ok(())
    }

    /// Position on `rid` of the current page. No-op when nothing is pinned.
    pub fn set_rid(&mut self, new_rid: Option<RecordId>) {
        if let State::OnPage { rid, .. } = &mut self.state {
            *rid = new_rid;
        }
    }

    pub fn mark_dirty(&mut self) -> HeapResult<()> {
        match &mut self.state {
            State::OnPage { page, .. } => {
                page.mark_dirty();
                Ok(())
            }
            _ => Err(HeapError::NoCurrentRecord),
        }
    }

    /// Unpin the current page, if any, and become unpositioned. The cursor
    /// is unpositioned afterwards even when the unpin fails.
    pub fn release(&mut self) -> HeapResult<()> {
        if let State::OnPage { page, .. } = mem::replace(&mut self.state, State::Unpositioned) {
            page.unpin()?;
        }
        Ok(())
    }

    /// Unpin the current page, if any, and move past the end of the chain.
    pub fn finish(&mut self) -> HeapResult<()> {
        let released = self.release();
        self.state = State::AtEnd;
        released
    }

    /// Return to a previously taken snapshot.
    pub fn restore(&mut self, pool: &BufferPoolManager, file: FileId, position: Position) -> HeapResult<()> {
        match position {
            Position::Unpositioned => self.release(),
            Position::AtEnd => self.finish(),
            Position::OnPage { page_id, rid } => {
                self.pin(pool, file, page_id)?;
                self.set_rid(rid);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::buffer::BufferPoolConfig;
    use anyhow::Result;
    use tempfile::{tempdir, TempDir};

    fn setup(pages: u32) -> Result<(TempDir, BufferPoolManager, FileId)> {
        let dir = tempdir()?;
        let pool = BufferPoolManager::new(BufferPoolConfig {
            data_dir: dir.path().to_path_buf(),
            max_frames: 8,
        })?;
        pool.files().create_file("cursor.db")?;
        let file = pool.files().open_file("cursor.db")?;
        for _ in 0..pages {
            let (_page_id, page) = pool.alloc_page(file)?;
            page.unpin()?;
        }
        Ok((dir, pool, file))
    }

    #[test]
    fn test_pin_switches_pages() -> Result<()> {
        let (_dir, pool, file) = setup(2)?;
        let mut cursor = Cursor::new();
        assert_eq!(cursor.position(), Position::Unpositioned);

        cursor.pin(&pool, file, PageId(0))?;
        cursor.set_rid(Some(RecordId::new(PageId(0), 3)));
        assert_eq!(pool.pin_count(file), 1);

        // Same page keeps the record position
        cursor.pin(&pool, file, PageId(0))?;
        assert_eq!(cursor.rid(), Some(RecordId::new(PageId(0), 3)));
        assert_eq!(pool.pin_count(file), 1);

        cursor.pin(&pool, file, PageId(1))?;
        assert_eq!(
            cursor.position(),
            Position::OnPage {
                page_id: PageId(1),
                rid: None
            }
        );
        assert_eq!(pool.pin_count(file), 1);

        cursor.release()?;
        assert_eq!(pool.pin_count(file), 0);
        assert!(!cursor.is_pinned());

        Ok(())
    }

    #[test]
    fn test_failed_pin_leaves_nothing_pinned() -> Result<()> {
        let (_dir, pool, file) = setup(1)?;
        let mut cursor = Cursor::new();

        cursor.pin(&pool, file, PageId(0))?;
        assert!(cursor.pin(&pool, file, PageId(9)).is_err());
        assert_eq!(cursor.position(), Position::Unpositioned);
        assert_eq!(pool.pin_count(file), 0);

        Ok(())
    }

    #[test]
    fn test_finish_and_restore() -> Result<()> {
        let (_dir, pool, file) = setup(2)?;
        let mut cursor = Cursor::new();

        cursor.pin(&pool, file, PageId(1))?;
        let rid = RecordId::new(PageId(1), 0);
        cursor.set_rid(Some(rid));
        let snapshot = cursor.position();

        cursor.finish()?;
        assert_eq!(cursor.position(), Position::AtEnd);
        assert_eq!(pool.pin_count(file), 0);
        assert!(matches!(cursor.mark_dirty(), Err(HeapError::NoCurrentRecord)));

        cursor.restore(&pool, file, snapshot)?;
        assert_eq!(cursor.rid(), Some(rid));
        assert_eq!(pool.pin_count(file), 1);

        cursor.restore(&pool, file, Position::Unpositioned)?;
        assert_eq!(pool.pin_count(file), 0);

        Ok(())
    }

    #[test]
    fn test_adopt_releases_previous_page() -> Result<()> {
        let (_dir, pool, file) = setup(1)?;
        let mut cursor = Cursor::new();
        cursor.pin(&pool, file, PageId(0))?;

        let (page_id, page) = pool.alloc_page(file)?;
        assert_eq!(pool.pin_count(file), 2);
        cursor.adopt(page)?;
        assert_eq!(cursor.current_page_id(), Some(page_id));
        assert_eq!(pool.pin_count(file), 1);

        cursor.mark_dirty()?;
        assert!(cursor.page().is_some_and(PinnedPage::is_dirty));

        Ok(())
    }
}
