// Table Heap
//
// A singly-linked chain of slotted pages holding (TupleMeta, Tuple)
// records addressed by RID. All mutations take a short-lived write guard
// on the target page.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{PageId, Rid, INVALID_PAGE_ID};
use crate::storage::buffer::{BufferPoolError, BufferPoolManager};
use crate::storage::page::{PageError, PageType, SlottedPage};
use crate::storage::table::tuple::{Tuple, TupleMeta, TUPLE_META_SIZE};

#[derive(Error, Debug)]
pub enum HeapError {
    #[error("Buffer pool error: {0}")]
    Buffer(#[from] BufferPoolError),

    #[error("Page error: {0}")]
    Page(#[from] PageError),

    #[error("Tuple serialization error: {0}")]
    Serde(#[from] bincode::Error),

    #[error("Tuple of {0} bytes does not fit on an empty page")]
    TupleTooLarge(usize),

    #[error("Update guard predicate rejected tuple at {0}")]
    GuardCheckFailed(Rid),
}

/// Predicate checked under the page write latch before an in-place update
/// is applied.
pub type UpdateCheck<'a> = &'a dyn Fn(&TupleMeta, &Tuple, Rid) -> bool;

pub struct TableHeap {
    bpm: Arc<BufferPoolManager>,
    first_page_id: PageId,
    last_page_id: Mutex<PageId>,
}

impl TableHeap {
    /// Create a heap with one empty page.
    pub fn new(bpm: Arc<BufferPoolManager>) -> Result<Self, HeapError> {
        let guard = bpm.new_page_guarded()?;
        let first_page_id = guard.page_id();
        {
            let mut page = guard.upgrade_write();
            SlottedPage::init(&mut page, PageType::Tuple);
        }
        Ok(Self {
            bpm,
            first_page_id,
            last_page_id: Mutex::new(first_page_id),
        })
    }

    /// Re-attach to an existing heap rooted at `first_page_id`.
    pub fn open(
        bpm: Arc<BufferPoolManager>,
        first_page_id: PageId,
    ) -> Result<Self, HeapError> {
        let mut last = first_page_id;
        loop {
            let guard = bpm.fetch_page_read(last)?;
            let next = SlottedPage::next_page_id(&guard);
            if next == INVALID_PAGE_ID {
                break;
            }
            last = next;
        }
        Ok(Self {
            bpm,
            first_page_id,
            last_page_id: Mutex::new(last),
        })
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Append a tuple, allocating and linking a fresh page when the current
    /// tail refuses it.
    pub fn insert_tuple(&self, meta: TupleMeta, tuple: &Tuple) -> Result<Rid, HeapError> {
        let record = Self::encode_record(meta, tuple)?;

        let mut last_page_id = self.last_page_id.lock();
        {
            let mut page = self.bpm.fetch_page_write(*last_page_id)?;
            match SlottedPage::insert_record(&mut page, &record) {
                Ok(slot) => return Ok(Rid::new(*last_page_id, slot)),
                Err(PageError::InsufficientSpace) => {}
                Err(e) => return Err(e.into()),
            }
        }

        // Tail is full: chain a new page and retry there.
        let new_guard = self.bpm.new_page_guarded()?;
        let new_page_id = new_guard.page_id();
        let slot = {
            let mut new_page = new_guard.upgrade_write();
            SlottedPage::init(&mut new_page, PageType::Tuple);
            match SlottedPage::insert_record(&mut new_page, &record) {
                Ok(slot) => slot,
                Err(PageError::InsufficientSpace) => {
                    return Err(HeapError::TupleTooLarge(record.len()))
                }
                Err(e) => return Err(e.into()),
            }
        };
        {
            let mut old_tail = self.bpm.fetch_page_write(*last_page_id)?;
            SlottedPage::set_next_page_id(&mut old_tail, new_page_id);
        }
        *last_page_id = new_page_id;
        Ok(Rid::new(new_page_id, slot))
    }

    pub fn get_tuple(&self, rid: Rid) -> Result<(TupleMeta, Tuple), HeapError> {
        let page = self.bpm.fetch_page_read(rid.page_id)?;
        let record = SlottedPage::record(&page, rid.slot)?;
        Self::decode_record(record)
    }

    pub fn get_tuple_meta(&self, rid: Rid) -> Result<TupleMeta, HeapError> {
        let page = self.bpm.fetch_page_read(rid.page_id)?;
        let record = SlottedPage::record(&page, rid.slot)?;
        Ok(TupleMeta::from_bytes(record))
    }

    /// Rewrite only the meta prefix of a record.
    pub fn update_tuple_meta(&self, meta: TupleMeta, rid: Rid) -> Result<(), HeapError> {
        let mut page = self.bpm.fetch_page_write(rid.page_id)?;
        SlottedPage::overwrite_record_prefix(&mut page, rid.slot, &meta.to_bytes())?;
        Ok(())
    }

    /// Replace meta and tuple in place. The optional check runs under the
    /// page write latch against the outgoing record; a rejection leaves the
    /// record untouched.
    pub fn update_tuple_in_place(
        &self,
        meta: TupleMeta,
        tuple: &Tuple,
        rid: Rid,
        check: Option<UpdateCheck<'_>>,
    ) -> Result<(), HeapError> {
        let record = Self::encode_record(meta, tuple)?;
        let mut page = self.bpm.fetch_page_write(rid.page_id)?;
        if let Some(check) = check {
            let old = SlottedPage::record(&page, rid.slot)?;
            let (old_meta, old_tuple) = Self::decode_record(old)?;
            if !check(&old_meta, &old_tuple, rid) {
                return Err(HeapError::GuardCheckFailed(rid));
            }
        }
        SlottedPage::update_record(&mut page, rid.slot, &record)?;
        Ok(())
    }

    /// Forward iterator over `(rid, meta, tuple)`. The end point is fixed
    /// at creation, so tuples appended mid-scan are not visited.
    pub fn iter(&self) -> TableIterator {
        let stop = {
            let last_page_id = self.last_page_id.lock();
            match self.bpm.fetch_page_read(*last_page_id) {
                Ok(page) => Some((*last_page_id, SlottedPage::record_count(&page))),
                Err(_) => None,
            }
        };
        TableIterator {
            bpm: self.bpm.clone(),
            current_page_id: self.first_page_id,
            current_slot: 0,
            stop,
        }
    }

    fn encode_record(meta: TupleMeta, tuple: &Tuple) -> Result<Vec<u8>, HeapError> {
        let mut record = Vec::with_capacity(TUPLE_META_SIZE + 32);
        record.extend_from_slice(&meta.to_bytes());
        record.extend_from_slice(&tuple.to_bytes()?);
        Ok(record)
    }

    fn decode_record(record: &[u8]) -> Result<(TupleMeta, Tuple), HeapError> {
        let meta = TupleMeta::from_bytes(record);
        let tuple = Tuple::from_bytes(&record[TUPLE_META_SIZE..])?;
        Ok((meta, tuple))
    }
}

pub struct TableIterator {
    bpm: Arc<BufferPoolManager>,
    current_page_id: PageId,
    current_slot: u32,
    /// (page, record count) of the tail at creation time
    stop: Option<(PageId, u32)>,
}

impl Iterator for TableIterator {
    type Item = (Rid, TupleMeta, Tuple);

    fn next(&mut self) -> Option<Self::Item> {
        let (stop_page, stop_count) = self.stop?;
        loop {
            if self.current_page_id == INVALID_PAGE_ID {
                return None;
            }
            if self.current_page_id == stop_page && self.current_slot >= stop_count {
                return None;
            }

            let page = match self.bpm.fetch_page_read(self.current_page_id) {
                Ok(page) => page,
                Err(e) => {
                    log::warn!(
                        "table iterator failed to fetch page {}: {}",
                        self.current_page_id,
                        e
                    );
                    return None;
                }
            };

            if self.current_slot < SlottedPage::record_count(&page) {
                let rid = Rid::new(self.current_page_id, self.current_slot);
                self.current_slot += 1;
                let record = match SlottedPage::record(&page, rid.slot) {
                    Ok(record) => record,
                    Err(_) => continue,
                };
                match TableHeap::decode_record(record) {
                    Ok((meta, tuple)) => return Some((rid, meta, tuple)),
                    Err(e) => {
                        log::warn!("table iterator failed to decode {}: {}", rid, e);
                        continue;
                    }
                }
            }

            let next = SlottedPage::next_page_id(&page);
            drop(page);
            self.current_page_id = next;
            self.current_slot = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::BufferPoolConfig;
    use crate::storage::table::tuple::DataValue;
    use tempfile::NamedTempFile;

    fn test_heap() -> (TableHeap, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let bpm = BufferPoolManager::new(BufferPoolConfig::default(), file.path()).unwrap();
        (TableHeap::new(bpm).unwrap(), file)
    }

    fn row(id: i64) -> Tuple {
        Tuple::new(vec![DataValue::Integer(id), DataValue::Boolean(id % 2 == 0)])
    }

    #[test]
    fn test_insert_and_get() {
        let (heap, _file) = test_heap();
        let rid = heap.insert_tuple(TupleMeta::new(3, false), &row(1)).unwrap();
        let (meta, tuple) = heap.get_tuple(rid).unwrap();
        assert_eq!(meta.ts, 3);
        assert!(!meta.is_deleted);
        assert_eq!(tuple, row(1));
    }

    #[test]
    fn test_meta_update_preserves_tuple() {
        let (heap, _file) = test_heap();
        let rid = heap.insert_tuple(TupleMeta::new(1, false), &row(9)).unwrap();
        heap.update_tuple_meta(TupleMeta::new(8, true), rid).unwrap();
        let (meta, tuple) = heap.get_tuple(rid).unwrap();
        assert_eq!(meta.ts, 8);
        assert!(meta.is_deleted);
        assert_eq!(tuple, row(9));
    }

    #[test]
    fn test_update_in_place_with_check() {
        let (heap, _file) = test_heap();
        let rid = heap.insert_tuple(TupleMeta::new(1, false), &row(5)).unwrap();

        let reject: UpdateCheck<'_> = &|meta, _, _| meta.ts == 999;
        let err = heap
            .update_tuple_in_place(TupleMeta::new(2, false), &row(6), rid, Some(reject))
            .unwrap_err();
        assert!(matches!(err, HeapError::GuardCheckFailed(_)));
        assert_eq!(heap.get_tuple(rid).unwrap().1, row(5));

        let accept: UpdateCheck<'_> = &|meta, _, _| meta.ts == 1;
        heap.update_tuple_in_place(TupleMeta::new(2, false), &row(6), rid, Some(accept))
            .unwrap();
        assert_eq!(heap.get_tuple(rid).unwrap().1, row(6));
    }

    #[test]
    fn test_heap_spans_multiple_pages() {
        let (heap, _file) = test_heap();
        let wide = Tuple::new(vec![DataValue::Text("x".repeat(500))]);
        let mut rids = Vec::new();
        for _ in 0..40 {
            rids.push(heap.insert_tuple(TupleMeta::new(1, false), &wide).unwrap());
        }
        let pages: std::collections::HashSet<_> = rids.iter().map(|r| r.page_id).collect();
        assert!(pages.len() > 1);

        let scanned: Vec<_> = heap.iter().collect();
        assert_eq!(scanned.len(), 40);
        assert_eq!(scanned.iter().map(|(r, _, _)| *r).collect::<Vec<_>>(), rids);
    }

    #[test]
    fn test_iterator_end_fixed_at_creation() {
        let (heap, _file) = test_heap();
        for i in 0..3 {
            heap.insert_tuple(TupleMeta::new(1, false), &row(i)).unwrap();
        }
        let mut iter = heap.iter();
        iter.next().unwrap();
        // Appended after the iterator was created: not visited.
        heap.insert_tuple(TupleMeta::new(1, false), &row(99)).unwrap();
        let rest: Vec<_> = iter.collect();
        assert_eq!(rest.len(), 2);
    }
}
