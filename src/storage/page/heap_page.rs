use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{PageBuf, PageId, SlotId};
use crate::storage::PAGE_SIZE;
use byteorder::{ByteOrder, LittleEndian};
use std::ops::{Deref, DerefMut};

// Header structure (16 bytes)
pub const HEADER_SIZE: usize = 16;
const PAGE_ID_OFFSET: usize = 0;
const NEXT_PAGE_OFFSET: usize = 4;
const SLOT_COUNT_OFFSET: usize = 8;
const FREE_SPACE_POINTER_OFFSET: usize = 10;
const RECORD_COUNT_OFFSET: usize = 12;

// Slot size (4 bytes: 2 for offset, 2 for length)
pub const SLOT_SIZE: usize = 4;

/// Largest record an empty page can hold.
pub const MAX_RECORD_SIZE: usize = PAGE_SIZE - HEADER_SIZE - SLOT_SIZE;

/// Slotted data page of a heap file.
///
/// Record bytes grow upward from the header, the slot directory grows
/// downward from the end of the page. A slot with offset 0 is free: live
/// records always start at or after `HEADER_SIZE`. The view is generic over
/// the byte owner so it works on plain arrays as well as on buffer pool
/// lock guards.
pub struct HeapPage<B> {
    data: B,
}

impl<B: DerefMut<Target = PageBuf>> HeapPage<B> {
    /// Initialize an empty page in `data`.
    pub fn new(mut data: B, page_id: PageId) -> Self {
        data[..HEADER_SIZE].fill(0);
        LittleEndian::write_u32(&mut data[PAGE_ID_OFFSET..], page_id.0);
        LittleEndian::write_u32(&mut data[NEXT_PAGE_OFFSET..], PageId::INVALID);
        LittleEndian::write_u16(&mut data[FREE_SPACE_POINTER_OFFSET..], HEADER_SIZE as u16);

        Self { data }
    }

    pub fn set_next_page(&mut self, next: Option<PageId>) {
        LittleEndian::write_u32(&mut self.data[NEXT_PAGE_OFFSET..], PageId::encode(next));
    }

    pub fn insert_record(&mut self, record: &[u8]) -> StorageResult<SlotId> {
        let length = record.len();
        let reusable_slot = (0..self.slot_count()).find(|&slot_id| !self.is_live(slot_id));
        let required = length + if reusable_slot.is_some() { 0 } else { SLOT_SIZE };

        if self.free_space() < required {
            let reclaimable = self.free_space() + self.fragmented_space();
            if reclaimable < required {
                return Err(StorageError::NoSpace {
                    required,
                    available: reclaimable,
                });
            }
            self.compact();
        }

        let offset = self.free_space_pointer();
        let start = offset as usize;
        self.data[start..start + length].copy_from_slice(record);
        self.set_free_space_pointer(offset + length as u16);

        let slot_id = match reusable_slot {
            Some(slot_id) => slot_id,
            None => {
                let slot_id = self.slot_count();
                self.set_slot_count(slot_id + 1);
                slot_id
            }
        };
        self.set_slot(slot_id, offset, length as u16);
        self.set_record_count(self.record_count() + 1);

        Ok(slot_id)
    }

    pub fn delete_record(&mut self, slot_id: SlotId) -> StorageResult<()> {
        self.check_live(slot_id)?;

        // Record bytes stay behind as fragmentation until the next compaction
        self.set_slot(slot_id, 0, 0);
        self.set_record_count(self.record_count() - 1);

        Ok(())
    }

    pub fn record_mut(&mut self, slot_id: SlotId) -> StorageResult<&mut [u8]> {
        self.check_live(slot_id)?;
        let (offset, length) = self.slot(slot_id);
        Ok(&mut self.data[offset as usize..(offset + length) as usize])
    }

    /// Move every live record to the front of the data area.
    fn compact(&mut self) {
        let mut live: Vec<(SlotId, u16, u16)> = (0..self.slot_count())
            .filter(|&slot_id| self.is_live(slot_id))
            .map(|slot_id| {
                let (offset, length) = self.slot(slot_id);
                (slot_id, offset, length)
            })
            .collect();
        live.sort_by_key(|&(_, offset, _)| offset);

        let mut write_pointer = HEADER_SIZE as u16;
        for (slot_id, offset, length) in live {
            if offset != write_pointer {
                let src = offset as usize..(offset + length) as usize;
                self.data.copy_within(src, write_pointer as usize);
                self.set_slot(slot_id, write_pointer, length);
            }
            write_pointer += length;
        }
        self.set_free_space_pointer(write_pointer);
    }

    fn set_slot(&mut self, slot_id: SlotId, offset: u16, length: u16) {
        let slot_offset = Self::slot_offset(slot_id);
        LittleEndian::write_u16(&mut self.data[slot_offset..], offset);
        LittleEndian::write_u16(&mut self.data[slot_offset + 2..], length);
    }

    fn set_slot_count(&mut self, count: u16) {
        LittleEndian::write_u16(&mut self.data[SLOT_COUNT_OFFSET..], count);
    }

    fn set_free_space_pointer(&mut self, pointer: u16) {
        LittleEndian::write_u16(&mut self.data[FREE_SPACE_POINTER_OFFSET..], pointer);
    }

    fn set_record_count(&mut self, count: u16) {
        LittleEndian::write_u16(&mut self.data[RECORD_COUNT_OFFSET..], count);
    }
}

impl<B: Deref<Target = PageBuf>> HeapPage<B> {
    pub fn from_data(data: B) -> Self {
        Self { data }
    }

    pub fn page_id(&self) -> PageId {
        PageId(LittleEndian::read_u32(&self.data[PAGE_ID_OFFSET..]))
    }

    pub fn next_page(&self) -> Option<PageId> {
        PageId::decode(LittleEndian::read_u32(&self.data[NEXT_PAGE_OFFSET..]))
    }

    /// Number of slot entries, live or free.
    pub fn slot_count(&self) -> u16 {
        LittleEndian::read_u16(&self.data[SLOT_COUNT_OFFSET..])
    }

    /// Number of live records.
    pub fn record_count(&self) -> u16 {
        LittleEndian::read_u16(&self.data[RECORD_COUNT_OFFSET..])
    }

    pub fn get_record(&self, slot_id: SlotId) -> StorageResult<&[u8]> {
        self.check_live(slot_id)?;
        let (offset, length) = self.slot(slot_id);
        Ok(&self.data[offset as usize..(offset + length) as usize])
    }

    pub fn first_record(&self) -> Option<SlotId> {
        self.live_slot_from(0)
    }

    /// Next live slot after `slot_id`; `slot_id` itself need not be live.
    pub fn next_record(&self, slot_id: SlotId) -> Option<SlotId> {
        slot_id
            .checked_add(1)
            .and_then(|start| self.live_slot_from(start))
    }

    /// Contiguous bytes between the record area and the slot directory.
    pub fn free_space(&self) -> usize {
        let slot_array_start = PAGE_SIZE - self.slot_count() as usize * SLOT_SIZE;
        slot_array_start.saturating_sub(self.free_space_pointer() as usize)
    }

    fn fragmented_space(&self) -> usize {
        let used = self.free_space_pointer() as usize - HEADER_SIZE;
        let live: usize = (0..self.slot_count())
            .filter(|&slot_id| self.is_live(slot_id))
            .map(|slot_id| self.slot(slot_id).1 as usize)
            .sum();
        used - live
    }

    fn live_slot_from(&self, start: SlotId) -> Option<SlotId> {
        (start..self.slot_count()).find(|&slot_id| self.is_live(slot_id))
    }

    fn check_live(&self, slot_id: SlotId) -> StorageResult<()> {
        let slot_count = self.slot_count();
        if slot_id >= slot_count {
            return Err(StorageError::InvalidSlotId {
                slot_id,
                slot_count,
            });
        }
        if !self.is_live(slot_id) {
            return Err(StorageError::RecordNotFound {
                page_id: self.page_id(),
                slot_id,
            });
        }
        Ok(())
    }

    fn is_live(&self, slot_id: SlotId) -> bool {
        self.slot(slot_id).0 != 0
    }

    fn slot(&self, slot_id: SlotId) -> (u16, u16) {
        let slot_offset = Self::slot_offset(slot_id);
        (
            LittleEndian::read_u16(&self.data[slot_offset..]),
            LittleEndian::read_u16(&self.data[slot_offset + 2..]),
        )
    }

    fn free_space_pointer(&self) -> u16 {
        LittleEndian::read_u16(&self.data[FREE_SPACE_POINTER_OFFSET..])
    }

    fn slot_offset(slot_id: SlotId) -> usize {
        PAGE_SIZE - (slot_id as usize + 1) * SLOT_SIZE
    }
}

impl<'a> HeapPage<&'a mut PageBuf> {
    /// Like [`HeapPage::record_mut`], but keeps the borrow of the page bytes.
    pub fn into_record_mut(self, slot_id: SlotId) -> StorageResult<&'a mut [u8]> {
        self.check_live(slot_id)?;
        let (offset, length) = self.slot(slot_id);
        let data = self.data;
        Ok(&mut data[offset as usize..(offset + length) as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn empty_page() -> Box<PageBuf> {
        Box::new([0u8; PAGE_SIZE])
    }

    #[test]
    fn test_heap_page_initialization() {
        let mut data = empty_page();
        let page = HeapPage::new(&mut *data, PageId(42));

        assert_eq!(page.page_id(), PageId(42));
        assert_eq!(page.next_page(), None);
        assert_eq!(page.slot_count(), 0);
        assert_eq!(page.record_count(), 0);
        assert_eq!(page.first_record(), None);
        assert_eq!(page.free_space(), PAGE_SIZE - HEADER_SIZE);
    }

    #[test]
    fn test_insert_and_get_record() -> Result<()> {
        let mut data = empty_page();
        let mut page = HeapPage::new(&mut *data, PageId(1));

        let slot1 = page.insert_record(b"Hello, World!")?;
        let slot2 = page.insert_record(b"Second record")?;
        assert_eq!(slot1, 0);
        assert_eq!(slot2, 1);

        assert_eq!(page.get_record(slot1)?, b"Hello, World!");
        assert_eq!(page.get_record(slot2)?, b"Second record");
        assert_eq!(page.record_count(), 2);

        Ok(())
    }

    #[test]
    fn test_empty_record_is_live() -> Result<()> {
        let mut data = empty_page();
        let mut page = HeapPage::new(&mut *data, PageId(1));

        let slot = page.insert_record(&[])?;
        assert_eq!(page.get_record(slot)?.len(), 0);
        assert_eq!(page.first_record(), Some(slot));

        Ok(())
    }

    #[test]
    fn test_delete_record() -> Result<()> {
        let mut data = empty_page();
        let mut page = HeapPage::new(&mut *data, PageId(3));

        let slot = page.insert_record(b"Test record")?;
        page.delete_record(slot)?;

        assert!(matches!(
            page.get_record(slot),
            Err(StorageError::RecordNotFound {
                page_id: PageId(3),
                slot_id: 0
            })
        ));
        assert!(page.delete_record(slot).is_err());
        assert_eq!(page.record_count(), 0);

        Ok(())
    }

    #[test]
    fn test_iteration_skips_deleted_slots() -> Result<()> {
        let mut data = empty_page();
        let mut page = HeapPage::new(&mut *data, PageId(1));

        for i in 0..5u8 {
            page.insert_record(&[i])?;
        }
        page.delete_record(0)?;
        page.delete_record(2)?;

        assert_eq!(page.first_record(), Some(1));
        assert_eq!(page.next_record(1), Some(3));
        // Iteration may continue from a slot that was just deleted
        assert_eq!(page.next_record(2), Some(3));
        assert_eq!(page.next_record(4), None);

        Ok(())
    }

    #[test]
    fn test_deleted_slot_is_reused() -> Result<()> {
        let mut data = empty_page();
        let mut page = HeapPage::new(&mut *data, PageId(1));

        page.insert_record(b"one")?;
        page.insert_record(b"two")?;
        page.delete_record(0)?;

        let slot = page.insert_record(b"three")?;
        assert_eq!(slot, 0);
        assert_eq!(page.slot_count(), 2);
        assert_eq!(page.get_record(0)?, b"three");

        Ok(())
    }

    #[test]
    fn test_page_full() -> Result<()> {
        let mut data = empty_page();
        let mut page = HeapPage::new(&mut *data, PageId(1));

        let large_record = vec![0xAA; 1000];
        let mut count = 0;
        while page.free_space() >= large_record.len() + SLOT_SIZE {
            page.insert_record(&large_record)?;
            count += 1;
        }

        assert!(count > 0);
        assert!(matches!(
            page.insert_record(&large_record),
            Err(StorageError::NoSpace { .. })
        ));

        Ok(())
    }

    #[test]
    fn test_compaction_reclaims_deleted_space() -> Result<()> {
        let mut data = empty_page();
        let mut page = HeapPage::new(&mut *data, PageId(1));

        let record = vec![0x11; 2000];
        let slots: Vec<_> = (0..4)
            .map(|_| page.insert_record(&record))
            .collect::<StorageResult<_>>()?;
        page.delete_record(slots[1])?;

        // Contiguous space is too small, the hole left by slot 1 is not
        let bigger = vec![0x22; 2050];
        assert!(page.free_space() < bigger.len());
        let slot = page.insert_record(&bigger)?;

        assert_eq!(slot, slots[1]);
        assert_eq!(page.get_record(slots[0])?, &record[..]);
        assert_eq!(page.get_record(slots[2])?, &record[..]);
        assert_eq!(page.get_record(slots[3])?, &record[..]);
        assert_eq!(page.get_record(slot)?, &bigger[..]);

        Ok(())
    }

    #[test]
    fn test_max_record_fits_empty_page() -> Result<()> {
        let mut data = empty_page();
        let mut page = HeapPage::new(&mut *data, PageId(1));

        let record = vec![7u8; MAX_RECORD_SIZE];
        let slot = page.insert_record(&record)?;
        assert_eq!(page.get_record(slot)?.len(), MAX_RECORD_SIZE);
        assert_eq!(page.free_space(), 0);

        Ok(())
    }

    #[test]
    fn test_invalid_slot_id() {
        let mut data = empty_page();
        let page = HeapPage::new(&mut *data, PageId(1));

        assert!(matches!(
            page.get_record(0),
            Err(StorageError::InvalidSlotId { slot_id: 0, .. })
        ));
        assert!(page.get_record(100).is_err());
    }

    #[test]
    fn test_next_page_link() {
        let mut data = empty_page();
        let mut page = HeapPage::new(&mut *data, PageId(1));

        page.set_next_page(Some(PageId(9)));
        assert_eq!(page.next_page(), Some(PageId(9)));
        page.set_next_page(None);
        assert_eq!(page.next_page(), None);
    }

    #[test]
    fn test_record_mut_updates_in_place() -> Result<()> {
        let mut data = empty_page();
        {
            let mut page = HeapPage::new(&mut *data, PageId(5));
            let slot = page.insert_record(b"abc")?;
            page.record_mut(slot)?[0] = b'x';
        }
        {
            let page = HeapPage::from_data(&mut *data);
            let bytes = page.into_record_mut(0)?;
            bytes[2] = b'z';
        }

        let page = HeapPage::from_data(&*data);
        assert_eq!(page.page_id(), PageId(5));
        assert_eq!(page.get_record(0)?, b"xbz");

        Ok(())
    }
}
