use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use byteorder::{ByteOrder, LittleEndian};
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{PageId, INVALID_PAGE_ID, PAGE_SIZE};

// Metadata page (page 0) layout
const META_MAGIC: u32 = 0x4F4E_4547;
const META_MAGIC_OFFSET: usize = 0;
const META_NEXT_PAGE_ID_OFFSET: usize = 4;
const META_CATALOG_ROOT_OFFSET: usize = 8;

#[derive(Error, Debug)]
pub enum DiskManagerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),
}

/// DiskManager serializes raw page I/O against a single database file.
///
/// Page 0 of the file is the metadata page: it holds the page-id allocator
/// watermark and the catalog root pointer. All other pages are payload and
/// self-identify by type in their first bytes.
pub struct DiskManager {
    db_file: Mutex<File>,
    next_page_id: AtomicU32,
}

impl DiskManager {
    /// Open (or create) the database file at the given path.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, DiskManagerError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_path)?;

        // Read or initialize the metadata page.
        let mut meta = [0u8; PAGE_SIZE];
        let file_size = file.metadata()?.len();
        let next_page_id = if file_size >= PAGE_SIZE as u64 {
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut meta)?;
            if LittleEndian::read_u32(&meta[META_MAGIC_OFFSET..]) == META_MAGIC {
                LittleEndian::read_u32(&meta[META_NEXT_PAGE_ID_OFFSET..])
            } else {
                1
            }
        } else {
            // Fresh database: reserve a full metadata page so later partial
            // rewrites of it are covered by the file.
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&meta)?;
            1
        };

        let dm = Self {
            db_file: Mutex::new(file),
            next_page_id: AtomicU32::new(next_page_id),
        };
        dm.write_meta_page()?;
        Ok(dm)
    }

    /// Read a page from disk into the given buffer. Reading a page the file
    /// does not cover yet yields a zeroed buffer.
    pub fn read_page(
        &self,
        page_id: PageId,
        buffer: &mut [u8; PAGE_SIZE],
    ) -> Result<(), DiskManagerError> {
        if page_id == INVALID_PAGE_ID {
            return Err(DiskManagerError::InvalidPageId(page_id));
        }

        let offset = Self::page_offset(page_id);
        let mut file = self.db_file.lock();
        let file_size = file.metadata()?.len();
        if offset + PAGE_SIZE as u64 > file_size {
            buffer.fill(0);
            return Ok(());
        }
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buffer)?;
        Ok(())
    }

    /// Write a page buffer to disk.
    pub fn write_page(
        &self,
        page_id: PageId,
        buffer: &[u8; PAGE_SIZE],
    ) -> Result<(), DiskManagerError> {
        if page_id == INVALID_PAGE_ID {
            return Err(DiskManagerError::InvalidPageId(page_id));
        }

        let offset = Self::page_offset(page_id);
        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buffer)?;
        file.flush()?;
        Ok(())
    }

    /// Allocate a fresh page id. The watermark is persisted to the metadata
    /// page so ids stay dense across reopen.
    pub fn allocate_page(&self) -> Result<PageId, DiskManagerError> {
        let page_id = self.next_page_id.fetch_add(1, Ordering::SeqCst);
        self.write_meta_page()?;
        Ok(page_id)
    }

    /// Return a page id to the allocator. Freed ids are not recycled; the
    /// hook exists so callers have a single place to report deletions.
    pub fn deallocate_page(&self, _page_id: PageId) {}

    /// Record the catalog root page on the metadata page.
    pub fn set_catalog_root(&self, page_id: PageId) -> Result<(), DiskManagerError> {
        let mut file = self.db_file.lock();
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, page_id);
        file.seek(SeekFrom::Start(META_CATALOG_ROOT_OFFSET as u64))?;
        file.write_all(&buf)?;
        file.flush()?;
        Ok(())
    }

    /// Read the catalog root page id from the metadata page.
    pub fn catalog_root(&self) -> Result<PageId, DiskManagerError> {
        let mut file = self.db_file.lock();
        let mut buf = [0u8; 4];
        file.seek(SeekFrom::Start(META_CATALOG_ROOT_OFFSET as u64))?;
        match file.read_exact(&mut buf) {
            Ok(()) => Ok(LittleEndian::read_u32(&buf)),
            Err(_) => Ok(INVALID_PAGE_ID),
        }
    }

    fn write_meta_page(&self) -> Result<(), DiskManagerError> {
        let mut file = self.db_file.lock();
        let mut buf = [0u8; 8];
        LittleEndian::write_u32(&mut buf[0..4], META_MAGIC);
        LittleEndian::write_u32(&mut buf[4..8], self.next_page_id.load(Ordering::SeqCst));
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&buf)?;
        file.flush()?;
        Ok(())
    }

    fn page_offset(page_id: PageId) -> u64 {
        page_id as u64 * PAGE_SIZE as u64
    }
}
