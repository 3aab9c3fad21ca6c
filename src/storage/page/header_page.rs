//! Header page of a heap file.
//!
//! The first page of every heap file holds the file-level metadata: the file
//! name, the live record count, the page count and the two ends of the data
//! page chain. The page count includes the header page itself.

use crate::storage::page::{PageBuf, PageId};
use byteorder::{ByteOrder, LittleEndian};
use std::ops::{Deref, DerefMut};

/// Longest file name stored in the header, in bytes.
pub const MAX_NAME_SIZE: usize = 50;

const MAGIC: u32 = 0x4845_4150;

const MAGIC_OFFSET: usize = 0;
const NAME_OFFSET: usize = 4;
const RECORD_COUNT_OFFSET: usize = 56;
const PAGE_COUNT_OFFSET: usize = 60;
const FIRST_PAGE_OFFSET: usize = 64;
const LAST_PAGE_OFFSET: usize = 68;
const HEADER_END: usize = 72;

pub struct FileHeaderPage<B> {
    data: B,
}

impl<B: DerefMut<Target = PageBuf>> FileHeaderPage<B> {
    /// Initialize a header for a file with no data pages yet.
    pub fn new(mut data: B, file_name: &str) -> Self {
        data[..HEADER_END].fill(0);
        LittleEndian::write_u32(&mut data[MAGIC_OFFSET..], MAGIC);

        let name = file_name.as_bytes();
        let name_len = name.len().min(MAX_NAME_SIZE);
        data[NAME_OFFSET..NAME_OFFSET + name_len].copy_from_slice(&name[..name_len]);

        let mut header = Self { data };
        header.set_record_count(0);
        header.set_page_count(1);
        header.set_first_page(None);
        header.set_last_page(None);
        header
    }

    pub fn set_record_count(&mut self, count: u32) {
        LittleEndian::write_u32(&mut self.data[RECORD_COUNT_OFFSET..], count);
    }

    pub fn set_page_count(&mut self, count: u32) {
        LittleEndian::write_u32(&mut self.data[PAGE_COUNT_OFFSET..], count);
    }

    pub fn set_first_page(&mut self, page_id: Option<PageId>) {
        LittleEndian::write_u32(&mut self.data[FIRST_PAGE_OFFSET..], PageId::encode(page_id));
    }

    pub fn set_last_page(&mut self, page_id: Option<PageId>) {
        LittleEndian::write_u32(&mut self.data[LAST_PAGE_OFFSET..], PageId::encode(page_id));
    }
}

impl<B: Deref<Target = PageBuf>> FileHeaderPage<B> {
    pub fn from_data(data: B) -> Self {
        Self { data }
    }

    /// Whether the page carries a heap file header at all.
    pub fn is_valid(&self) -> bool {
        LittleEndian::read_u32(&self.data[MAGIC_OFFSET..]) == MAGIC
    }

    pub fn file_name(&self) -> String {
        let raw = &self.data[NAME_OFFSET..NAME_OFFSET + MAX_NAME_SIZE];
        let len = raw.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_SIZE);
        String::from_utf8_lossy(&raw[..len]).into_owned()
    }

    pub fn record_count(&self) -> u32 {
        LittleEndian::read_u32(&self.data[RECORD_COUNT_OFFSET..])
    }

    pub fn page_count(&self) -> u32 {
        LittleEndian::read_u32(&self.data[PAGE_COUNT_OFFSET..])
    }

    pub fn first_page(&self) -> Option<PageId> {
        PageId::decode(LittleEndian::read_u32(&self.data[FIRST_PAGE_OFFSET..]))
    }

    pub fn last_page(&self) -> Option<PageId> {
        PageId::decode(LittleEndian::read_u32(&self.data[LAST_PAGE_OFFSET..]))
    }
}
