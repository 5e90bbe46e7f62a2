// Page Guards
//
// Scoped handles over a pinned page. A basic guard owns only the pin; read
// and write guards additionally own the page latch. Drop order is fixed:
// latch first, then the pin, so no thread can observe a latched-but-
// unpinned page.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::RawRwLock;

use crate::common::types::{Page, PageId, PagePtr};
use crate::storage::buffer::manager::BufferPoolManager;

type OwnedReadGuard = ArcRwLockReadGuard<RawRwLock, Page>;
type OwnedWriteGuard = ArcRwLockWriteGuard<RawRwLock, Page>;

/// Pin-only guard. Upgrades into a latched guard, transferring the pin.
pub struct PageGuard {
    bpm: Arc<BufferPoolManager>,
    page: PagePtr,
    page_id: PageId,
    active: bool,
}

impl PageGuard {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, page_id: PageId, page: PagePtr) -> Self {
        Self {
            bpm,
            page,
            page_id,
            active: true,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Take the shared latch, consuming this guard. The pin moves into the
    /// returned guard.
    pub fn upgrade_read(mut self) -> ReadPageGuard {
        self.active = false;
        ReadPageGuard {
            bpm: self.bpm.clone(),
            page_id: self.page_id,
            guard: Some(self.page.read_arc()),
        }
    }

    /// Take the exclusive latch, consuming this guard.
    pub fn upgrade_write(mut self) -> WritePageGuard {
        self.active = false;
        WritePageGuard {
            bpm: self.bpm.clone(),
            page_id: self.page_id,
            guard: Some(self.page.write_arc()),
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if self.active {
            let _ = self.bpm.unpin_page(self.page_id, false);
        }
    }
}

/// Shared-latched, pinned page handle.
pub struct ReadPageGuard {
    bpm: Arc<BufferPoolManager>,
    page_id: PageId,
    guard: Option<OwnedReadGuard>,
}

impl ReadPageGuard {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl Deref for ReadPageGuard {
    type Target = Page;

    fn deref(&self) -> &Page {
        self.guard.as_ref().expect("latch held until drop")
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Latch before pin.
        self.guard.take();
        let _ = self.bpm.unpin_page(self.page_id, false);
    }
}

/// Exclusively-latched, pinned page handle. Dropping it unpins with the
/// dirty flag set, since the holder had mutable access.
pub struct WritePageGuard {
    bpm: Arc<BufferPoolManager>,
    page_id: PageId,
    guard: Option<OwnedWriteGuard>,
}

impl WritePageGuard {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl Deref for WritePageGuard {
    type Target = Page;

    fn deref(&self) -> &Page {
        self.guard.as_ref().expect("latch held until drop")
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Page {
        self.guard.as_mut().expect("latch held until drop")
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.guard.take();
        let _ = self.bpm.unpin_page(self.page_id, true);
    }
}
