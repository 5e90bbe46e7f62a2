// Buffer Pool Manager
//
// Maps page ids onto a fixed set of frames, pins pages on behalf of
// callers, and reclaims frames through the LRU-K replacer. One pool-wide
// mutex guards the page table, free list and per-frame metadata; page
// payloads are protected by their own latch (the RwLock inside PagePtr).

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Weak};

use log::warn;
use parking_lot::Mutex;

use crate::common::config::BufferPoolConfig;
use crate::common::types::{FrameId, Page, PageId, PagePtr, INVALID_PAGE_ID};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::guard::{PageGuard, ReadPageGuard, WritePageGuard};
use crate::storage::buffer::replacer::LruKReplacer;
use crate::storage::disk::{DiskManager, DiskRequest, DiskScheduler};

struct Frame {
    page: PagePtr,
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
}

struct PoolState {
    frames: Vec<Frame>,
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

pub struct BufferPoolManager {
    pool_size: usize,
    state: Mutex<PoolState>,
    replacer: LruKReplacer,
    disk_scheduler: DiskScheduler,
    disk_manager: Arc<DiskManager>,
    /// Back-reference handed to page guards; the pool is always built
    /// behind an Arc.
    self_ref: Weak<BufferPoolManager>,
}

impl BufferPoolManager {
    pub fn new(
        config: BufferPoolConfig,
        db_path: impl AsRef<Path>,
    ) -> Result<Arc<Self>, BufferPoolError> {
        let disk_manager = Arc::new(DiskManager::new(db_path)?);
        Ok(Self::with_disk_manager(config, disk_manager))
    }

    pub fn with_disk_manager(
        config: BufferPoolConfig,
        disk_manager: Arc<DiskManager>,
    ) -> Arc<Self> {
        let mut frames = Vec::with_capacity(config.pool_size);
        let mut free_list = VecDeque::with_capacity(config.pool_size);
        for i in 0..config.pool_size {
            frames.push(Frame {
                page: Arc::new(parking_lot::RwLock::new(Page::new(INVALID_PAGE_ID))),
                page_id: INVALID_PAGE_ID,
                pin_count: 0,
                is_dirty: false,
            });
            free_list.push_back(i as FrameId);
        }

        Arc::new_cyclic(|self_ref| Self {
            pool_size: config.pool_size,
            state: Mutex::new(PoolState {
                frames,
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: LruKReplacer::new(config.pool_size, config.replacer_k),
            disk_scheduler: DiskScheduler::new(disk_manager.clone()),
            disk_manager,
            self_ref: self_ref.clone(),
        })
    }

    fn shared(&self) -> Arc<Self> {
        self.self_ref
            .upgrade()
            .expect("buffer pool manager is always behind an Arc")
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    /// Allocate a fresh page and pin it into a frame.
    pub fn new_page(&self) -> Result<(PageId, PagePtr), BufferPoolError> {
        let mut state = self.state.lock();
        let frame_id = self.acquire_frame(&mut state)?;

        let page_id = match self.disk_manager.allocate_page() {
            Ok(id) => id,
            Err(e) => {
                state.free_list.push_back(frame_id);
                return Err(e.into());
            }
        };

        let frame = &mut state.frames[frame_id as usize];
        frame.page_id = page_id;
        frame.pin_count = 1;
        // A fresh page only exists in memory until its first flush.
        frame.is_dirty = true;
        {
            let mut page = frame.page.write();
            page.reset();
            page.page_id = page_id;
        }
        let page = frame.page.clone();

        state.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);
        Ok((page_id, page))
    }

    /// Fetch a page, pinning it. Reads from disk when not resident.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidOperation(
                "cannot fetch the invalid page id".to_string(),
            ));
        }

        let mut state = self.state.lock();
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &mut state.frames[frame_id as usize];
            frame.pin_count += 1;
            let page = frame.page.clone();
            self.replacer.record_access(frame_id);
            self.replacer.set_evictable(frame_id, false);
            return Ok(page);
        }

        let frame_id = self.acquire_frame(&mut state)?;
        let page = state.frames[frame_id as usize].page.clone();

        let (done, completion) = DiskScheduler::create_promise();
        self.disk_scheduler.schedule(DiskRequest::Read {
            page_id,
            page: page.clone(),
            done,
        });
        if !completion.recv().unwrap_or(false) {
            state.free_list.push_back(frame_id);
            return Err(BufferPoolError::ReadFailed(page_id));
        }

        let frame = &mut state.frames[frame_id as usize];
        frame.page_id = page_id;
        frame.pin_count = 1;
        frame.is_dirty = false;
        state.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);
        Ok(page)
    }

    /// Drop one pin. At pin count zero the frame becomes evictable. The
    /// dirty flag is OR-sticky until the next flush.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();
        let frame_id = *state
            .page_table
            .get(&page_id)
            .ok_or(BufferPoolError::PageNotFound(page_id))?;
        let frame = &mut state.frames[frame_id as usize];
        if frame.pin_count == 0 {
            return Err(BufferPoolError::PageNotPinned(page_id));
        }
        frame.pin_count -= 1;
        frame.is_dirty |= is_dirty;
        if frame.pin_count == 0 {
            self.replacer.set_evictable(frame_id, true);
        }
        Ok(())
    }

    /// Write a resident page to disk (regardless of the dirty bit) and clear
    /// its dirty flag. The page latch is taken without the pool mutex held,
    /// so a latch holder calling back into the pool cannot deadlock a flush.
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let page = {
            let state = self.state.lock();
            let frame_id = *state
                .page_table
                .get(&page_id)
                .ok_or(BufferPoolError::PageNotFound(page_id))?;
            state.frames[frame_id as usize].page.clone()
        };
        let data = Box::new(page.read().data);

        let (done, completion) = DiskScheduler::create_promise();
        self.disk_scheduler.schedule(DiskRequest::Write {
            page_id,
            data,
            done,
        });
        if !completion.recv().unwrap_or(false) {
            return Err(BufferPoolError::FlushFailed(page_id));
        }

        // The frame may have been recycled while the pool was unlocked;
        // only clear the dirty bit if the mapping still stands.
        let mut state = self.state.lock();
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            state.frames[frame_id as usize].is_dirty = false;
        }
        Ok(())
    }

    /// Flush every resident page.
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let page_ids: Vec<PageId> = {
            let state = self.state.lock();
            state.page_table.keys().copied().collect()
        };
        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Drop a page from the pool and deallocate its id. Succeeds vacuously
    /// when the page is not resident; fails when it is pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();
        let frame_id = match state.page_table.get(&page_id) {
            Some(&id) => id,
            None => return Ok(()),
        };
        if state.frames[frame_id as usize].pin_count > 0 {
            return Err(BufferPoolError::PagePinned(page_id));
        }

        self.replacer.remove(frame_id)?;
        state.page_table.remove(&page_id);
        let frame = &mut state.frames[frame_id as usize];
        frame.page_id = INVALID_PAGE_ID;
        frame.pin_count = 0;
        frame.is_dirty = false;
        frame.page.write().reset();
        state.free_list.push_back(frame_id);
        self.disk_manager.deallocate_page(page_id);
        Ok(())
    }

    /// Current pin count of a resident page (test and debug aid).
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        let frame_id = *state.page_table.get(&page_id)?;
        Some(state.frames[frame_id as usize].pin_count)
    }

    // Guard-returning variants. Guards own one pin each and release it on
    // drop; read/write guards also hold the page latch.

    pub fn new_page_guarded(&self) -> Result<PageGuard, BufferPoolError> {
        let (page_id, page) = self.new_page()?;
        Ok(PageGuard::new(self.shared(), page_id, page))
    }

    pub fn fetch_page_basic(&self, page_id: PageId) -> Result<PageGuard, BufferPoolError> {
        let page = self.fetch_page(page_id)?;
        Ok(PageGuard::new(self.shared(), page_id, page))
    }

    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard, BufferPoolError> {
        Ok(self.fetch_page_basic(page_id)?.upgrade_read())
    }

    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard, BufferPoolError> {
        Ok(self.fetch_page_basic(page_id)?.upgrade_write())
    }

    /// Obtain a frame: free list first, else evict. Dirty victims are
    /// flushed through the disk scheduler before their frame is reused.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.evict().ok_or(BufferPoolError::BufferPoolFull)?;
        let (old_page_id, dirty_data) = {
            let frame = &state.frames[frame_id as usize];
            let data = if frame.is_dirty {
                Some(Box::new(frame.page.read().data))
            } else {
                None
            };
            (frame.page_id, data)
        };

        if let Some(data) = dirty_data {
            let (done, completion) = DiskScheduler::create_promise();
            self.disk_scheduler.schedule(DiskRequest::Write {
                page_id: old_page_id,
                data,
                done,
            });
            if !completion.recv().unwrap_or(false) {
                warn!(
                    "flush of evicted page {} failed; abandoning eviction",
                    old_page_id
                );
                self.replacer.record_access(frame_id);
                self.replacer.set_evictable(frame_id, true);
                return Err(BufferPoolError::FlushFailed(old_page_id));
            }
        }

        if old_page_id != INVALID_PAGE_ID {
            state.page_table.remove(&old_page_id);
        }
        let frame = &mut state.frames[frame_id as usize];
        frame.page_id = INVALID_PAGE_ID;
        frame.pin_count = 0;
        frame.is_dirty = false;
        frame.page.write().reset();
        Ok(frame_id)
    }
}
