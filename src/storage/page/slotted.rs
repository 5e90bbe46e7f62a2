// Slotted Page Codec
//
// Stateless accessors over the raw bytes of a slotted page. Records keep
// their slot for life; an in-place update may not outgrow the slot's
// original capacity. Shorter rewrites are zero-padded, which readers must
// tolerate as trailing bytes.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::common::types::{Page, PageId, PAGE_SIZE};
use crate::storage::page::header::{PageHeader, PageType, SLOTTED_HEADER_SIZE, SLOT_SIZE};

#[derive(Error, Debug)]
pub enum PageError {
    #[error("Insufficient space on page")]
    InsufficientSpace,
    #[error("Invalid slot {0}")]
    InvalidSlot(u32),
    #[error("Record of {len} bytes exceeds slot capacity {capacity}")]
    RecordTooLarge { len: usize, capacity: usize },
    #[error("Page is not of the expected type")]
    WrongPageType,
}

#[derive(Debug, Clone, Copy)]
struct SlotEntry {
    offset: u32,
    capacity: u32,
}

impl SlotEntry {
    fn to_bytes(self) -> [u8; SLOT_SIZE] {
        let mut bytes = [0u8; SLOT_SIZE];
        LittleEndian::write_u32(&mut bytes[0..4], self.offset);
        LittleEndian::write_u32(&mut bytes[4..8], self.capacity);
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            offset: LittleEndian::read_u32(&bytes[0..4]),
            capacity: LittleEndian::read_u32(&bytes[4..8]),
        }
    }
}

pub struct SlottedPage;

impl SlottedPage {
    /// Format the page as an empty slotted page of the given type.
    pub fn init(page: &mut Page, page_type: PageType) {
        let header = PageHeader::new(page_type);
        page.data[0..SLOTTED_HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    pub fn header(page: &Page) -> PageHeader {
        PageHeader::from_bytes(&page.data[0..SLOTTED_HEADER_SIZE])
    }

    fn write_header(page: &mut Page, header: &PageHeader) {
        page.data[0..SLOTTED_HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    pub fn record_count(page: &Page) -> u32 {
        Self::header(page).record_count
    }

    pub fn next_page_id(page: &Page) -> PageId {
        Self::header(page).next_page_id
    }

    pub fn set_next_page_id(page: &mut Page, next_page_id: PageId) {
        let mut header = Self::header(page);
        header.next_page_id = next_page_id;
        Self::write_header(page, &header);
    }

    /// Append a record, returning its slot index.
    pub fn insert_record(page: &mut Page, data: &[u8]) -> Result<u32, PageError> {
        let mut header = Self::header(page);
        let needed = data.len() + SLOT_SIZE;
        if (header.free_space_size as usize) < needed {
            return Err(PageError::InsufficientSpace);
        }

        let slot = header.record_count;
        let entry = SlotEntry {
            offset: header.free_space_offset,
            capacity: data.len() as u32,
        };

        let start = header.free_space_offset as usize;
        page.data[start..start + data.len()].copy_from_slice(data);

        let slot_pos = Self::slot_position(slot);
        page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&entry.to_bytes());

        header.free_space_offset += data.len() as u32;
        header.free_space_size -= needed as u32;
        header.record_count += 1;
        Self::write_header(page, &header);

        Ok(slot)
    }

    /// Read the full slot contents; a record shorter than its slot capacity
    /// carries trailing zero padding.
    pub fn record(page: &Page, slot: u32) -> Result<&[u8], PageError> {
        let entry = Self::slot_entry(page, slot)?;
        let start = entry.offset as usize;
        Ok(&page.data[start..start + entry.capacity as usize])
    }

    /// Overwrite a record in place. The new payload must fit the slot.
    pub fn update_record(page: &mut Page, slot: u32, data: &[u8]) -> Result<(), PageError> {
        let entry = Self::slot_entry(page, slot)?;
        if data.len() > entry.capacity as usize {
            return Err(PageError::RecordTooLarge {
                len: data.len(),
                capacity: entry.capacity as usize,
            });
        }
        let start = entry.offset as usize;
        page.data[start..start + data.len()].copy_from_slice(data);
        // Zero-pad so stale bytes from a longer previous version cannot leak.
        page.data[start + data.len()..start + entry.capacity as usize].fill(0);
        Ok(())
    }

    /// Overwrite only the first bytes of a record, leaving the rest intact.
    pub fn overwrite_record_prefix(
        page: &mut Page,
        slot: u32,
        prefix: &[u8],
    ) -> Result<(), PageError> {
        let entry = Self::slot_entry(page, slot)?;
        if prefix.len() > entry.capacity as usize {
            return Err(PageError::RecordTooLarge {
                len: prefix.len(),
                capacity: entry.capacity as usize,
            });
        }
        let start = entry.offset as usize;
        page.data[start..start + prefix.len()].copy_from_slice(prefix);
        Ok(())
    }

    fn slot_entry(page: &Page, slot: u32) -> Result<SlotEntry, PageError> {
        let header = Self::header(page);
        if slot >= header.record_count {
            return Err(PageError::InvalidSlot(slot));
        }
        let slot_pos = Self::slot_position(slot);
        Ok(SlotEntry::from_bytes(&page.data[slot_pos..slot_pos + SLOT_SIZE]))
    }

    fn slot_position(slot: u32) -> usize {
        PAGE_SIZE - SLOT_SIZE * (slot as usize + 1)
    }
}
