// Hash Header Page
//
// Top tier of the extendible hash index: routes the high bits of a key
// hash to one of up to 2^max_depth directory pages.

use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Page, PageId, INVALID_PAGE_ID, PAGE_SIZE};
use crate::index::hash::error::IndexError;
use crate::storage::page::PageType;

const TYPE_OFFSET: usize = 0;
const MAX_DEPTH_OFFSET: usize = 4;
const DIRECTORY_IDS_OFFSET: usize = 8;

/// Largest header depth whose directory-id array fits on one page.
pub const HASH_HEADER_MAX_DEPTH: u32 = 9;

#[derive(Debug)]
pub struct HashHeaderPage {
    max_depth: u32,
    directory_page_ids: Vec<PageId>,
}

impl HashHeaderPage {
    pub fn new(max_depth: u32) -> Self {
        Self {
            max_depth,
            directory_page_ids: vec![INVALID_PAGE_ID; 1 << max_depth],
        }
    }

    /// Format a fresh page and return the in-memory view.
    pub fn init(page: &mut Page, max_depth: u32) -> Self {
        let header = Self::new(max_depth);
        header.store(page);
        header
    }

    pub fn load(page: &Page) -> Result<Self, IndexError> {
        if PageType::from_u32(LittleEndian::read_u32(&page.data[TYPE_OFFSET..]))
            != PageType::HashHeader
        {
            return Err(IndexError::WrongPageType);
        }
        let max_depth = LittleEndian::read_u32(&page.data[MAX_DEPTH_OFFSET..]);
        let count = 1usize << max_depth;
        let mut directory_page_ids = Vec::with_capacity(count);
        for i in 0..count {
            let offset = DIRECTORY_IDS_OFFSET + i * 4;
            directory_page_ids.push(LittleEndian::read_u32(&page.data[offset..]));
        }
        Ok(Self {
            max_depth,
            directory_page_ids,
        })
    }

    pub fn store(&self, page: &mut Page) {
        LittleEndian::write_u32(
            &mut page.data[TYPE_OFFSET..TYPE_OFFSET + 4],
            PageType::HashHeader.to_u32(),
        );
        LittleEndian::write_u32(
            &mut page.data[MAX_DEPTH_OFFSET..MAX_DEPTH_OFFSET + 4],
            self.max_depth,
        );
        for (i, &id) in self.directory_page_ids.iter().enumerate() {
            let offset = DIRECTORY_IDS_OFFSET + i * 4;
            LittleEndian::write_u32(&mut page.data[offset..offset + 4], id);
        }
        debug_assert!(DIRECTORY_IDS_OFFSET + self.directory_page_ids.len() * 4 <= PAGE_SIZE);
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Route by the top `max_depth` bits of the hash.
    pub fn hash_to_directory_index(&self, hash: u32) -> usize {
        if self.max_depth == 0 {
            0
        } else {
            (hash >> (32 - self.max_depth)) as usize
        }
    }

    pub fn directory_page_id(&self, idx: usize) -> PageId {
        self.directory_page_ids[idx]
    }

    pub fn set_directory_page_id(&mut self, idx: usize, page_id: PageId) {
        self.directory_page_ids[idx] = page_id;
    }
}
