use crate::storage::page::{PageId, SlotId};
use std::cmp::Ordering;
use std::fmt;

/// Stable address of a record: the page holding it and its slot there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot_id: SlotId,
}

impl RecordId {
    pub fn new(page_id: PageId, slot_id: SlotId) -> Self {
        Self { page_id, slot_id }
    }
}

impl PartialOrd for RecordId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.page_id
            .cmp(&other.page_id)
            .then(self.slot_id.cmp(&other.slot_id))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}.{})", self.page_id, self.slot_id)
    }
}

/// A copy of a record's bytes together with its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub rid: RecordId,
    pub data: Vec<u8>,
}

impl Record {
    pub fn new(rid: RecordId, data: Vec<u8>) -> Self {
        Self { rid, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
