// Hash Directory Page
//
// Middle tier of the extendible hash index: 2^global_depth slots, each
// carrying a bucket page id and the local depth of that bucket. A bucket
// with local depth d owns every slot whose low d bits match; its split
// image at depth d is the slot with bit d-1 flipped.

use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Page, PageId, INVALID_PAGE_ID};
use crate::index::hash::error::IndexError;
use crate::storage::page::PageType;

const TYPE_OFFSET: usize = 0;
const MAX_DEPTH_OFFSET: usize = 4;
const GLOBAL_DEPTH_OFFSET: usize = 8;
const LOCAL_DEPTHS_OFFSET: usize = 12;

/// Largest directory depth whose arrays fit on one page.
pub const HASH_DIRECTORY_MAX_DEPTH: u32 = 9;

#[derive(Debug)]
pub struct HashDirectoryPage {
    max_depth: u32,
    global_depth: u32,
    local_depths: Vec<u8>,
    bucket_page_ids: Vec<PageId>,
}

impl HashDirectoryPage {
    pub fn new(max_depth: u32) -> Self {
        let capacity = 1usize << max_depth;
        Self {
            max_depth,
            global_depth: 0,
            local_depths: vec![0; capacity],
            bucket_page_ids: vec![INVALID_PAGE_ID; capacity],
        }
    }

    pub fn load(page: &Page) -> Result<Self, IndexError> {
        if PageType::from_u32(LittleEndian::read_u32(&page.data[TYPE_OFFSET..]))
            != PageType::HashDirectory
        {
            return Err(IndexError::WrongPageType);
        }
        let max_depth = LittleEndian::read_u32(&page.data[MAX_DEPTH_OFFSET..]);
        let global_depth = LittleEndian::read_u32(&page.data[GLOBAL_DEPTH_OFFSET..]);
        let capacity = 1usize << max_depth;
        let local_depths =
            page.data[LOCAL_DEPTHS_OFFSET..LOCAL_DEPTHS_OFFSET + capacity].to_vec();
        let ids_offset = LOCAL_DEPTHS_OFFSET + capacity;
        let mut bucket_page_ids = Vec::with_capacity(capacity);
        for i in 0..capacity {
            bucket_page_ids.push(LittleEndian::read_u32(&page.data[ids_offset + i * 4..]));
        }
        Ok(Self {
            max_depth,
            global_depth,
            local_depths,
            bucket_page_ids,
        })
    }

    pub fn store(&self, page: &mut Page) {
        LittleEndian::write_u32(
            &mut page.data[TYPE_OFFSET..TYPE_OFFSET + 4],
            PageType::HashDirectory.to_u32(),
        );
        LittleEndian::write_u32(
            &mut page.data[MAX_DEPTH_OFFSET..MAX_DEPTH_OFFSET + 4],
            self.max_depth,
        );
        LittleEndian::write_u32(
            &mut page.data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4],
            self.global_depth,
        );
        let capacity = 1usize << self.max_depth;
        page.data[LOCAL_DEPTHS_OFFSET..LOCAL_DEPTHS_OFFSET + capacity]
            .copy_from_slice(&self.local_depths);
        let ids_offset = LOCAL_DEPTHS_OFFSET + capacity;
        for (i, &id) in self.bucket_page_ids.iter().enumerate() {
            LittleEndian::write_u32(&mut page.data[ids_offset + i * 4..ids_offset + i * 4 + 4], id);
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    /// Number of live slots.
    pub fn size(&self) -> usize {
        1usize << self.global_depth
    }

    /// Route by the low `global_depth` bits of the hash.
    pub fn hash_to_bucket_index(&self, hash: u32) -> usize {
        (hash as usize) & (self.size() - 1)
    }

    pub fn bucket_page_id(&self, idx: usize) -> PageId {
        self.bucket_page_ids[idx]
    }

    pub fn set_bucket_page_id(&mut self, idx: usize, page_id: PageId) {
        self.bucket_page_ids[idx] = page_id;
    }

    pub fn local_depth(&self, idx: usize) -> u32 {
        self.local_depths[idx] as u32
    }

    pub fn set_local_depth(&mut self, idx: usize, depth: u8) {
        self.local_depths[idx] = depth;
    }

    /// Double the directory: the new upper half mirrors the lower half.
    pub fn incr_global_depth(&mut self) {
        let old_size = self.size();
        for i in old_size..old_size * 2 {
            self.bucket_page_ids[i] = self.bucket_page_ids[i - old_size];
            self.local_depths[i] = self.local_depths[i - old_size];
        }
        self.global_depth += 1;
    }

    pub fn decr_global_depth(&mut self) {
        self.global_depth -= 1;
    }

    /// The directory may halve when no slot uses all global_depth bits.
    pub fn can_shrink(&self) -> bool {
        self.global_depth > 0
            && (0..self.size()).all(|i| self.local_depth(i) < self.global_depth)
    }

    /// Sibling slot of `idx` for a bucket at the given local depth.
    pub fn split_image_index(idx: usize, local_depth: u32) -> usize {
        idx ^ (1usize << (local_depth - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_load_roundtrip() {
        let mut dir = HashDirectoryPage::new(3);
        dir.incr_global_depth();
        dir.set_bucket_page_id(0, 21);
        dir.set_bucket_page_id(1, 22);
        dir.set_local_depth(0, 1);
        dir.set_local_depth(1, 1);

        let mut page = Page::new(1);
        dir.store(&mut page);
        let loaded = HashDirectoryPage::load(&page).unwrap();
        assert_eq!(loaded.global_depth(), 1);
        assert_eq!(loaded.max_depth(), 3);
        assert_eq!(loaded.bucket_page_id(0), 21);
        assert_eq!(loaded.bucket_page_id(1), 22);
        assert_eq!(loaded.local_depth(1), 1);
    }

    #[test]
    fn test_grow_mirrors_lower_half() {
        let mut dir = HashDirectoryPage::new(3);
        dir.set_bucket_page_id(0, 5);
        dir.set_local_depth(0, 0);
        dir.incr_global_depth();
        assert_eq!(dir.size(), 2);
        assert_eq!(dir.bucket_page_id(1), 5);
        assert_eq!(dir.local_depth(1), 0);
    }

    #[test]
    fn test_shrink_condition() {
        let mut dir = HashDirectoryPage::new(3);
        dir.set_bucket_page_id(0, 5);
        dir.incr_global_depth();
        // Both slots still at local depth 0 < global depth 1.
        assert!(dir.can_shrink());
        dir.set_local_depth(0, 1);
        dir.set_local_depth(1, 1);
        assert!(!dir.can_shrink());
    }

    #[test]
    fn test_split_image() {
        assert_eq!(HashDirectoryPage::split_image_index(0, 1), 1);
        assert_eq!(HashDirectoryPage::split_image_index(2, 2), 0);
        assert_eq!(HashDirectoryPage::split_image_index(5, 3), 1);
    }

    #[test]
    fn test_bucket_routing_uses_low_bits() {
        let mut dir = HashDirectoryPage::new(3);
        dir.incr_global_depth();
        dir.incr_global_depth();
        assert_eq!(dir.hash_to_bucket_index(0b1101), 0b01);
        assert_eq!(dir.hash_to_bucket_index(0b0110), 0b10);
    }
}
