pub mod header_page;
pub mod heap_page;

use crate::storage::PAGE_SIZE;
use std::fmt;

/// Raw bytes of one page frame.
pub type PageBuf = [u8; PAGE_SIZE];

/// Index of a record slot within a page.
pub type SlotId = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    /// On-page encoding of "no page".
    pub const INVALID: u32 = u32::MAX;

    pub(crate) fn decode(raw: u32) -> Option<PageId> {
        (raw != Self::INVALID).then_some(PageId(raw))
    }

    pub(crate) fn encode(page_id: Option<PageId>) -> u32 {
        page_id.map_or(Self::INVALID, |id| id.0)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub use header_page::{FileHeaderPage, MAX_NAME_SIZE};
pub use heap_page::{HeapPage, MAX_RECORD_SIZE};
