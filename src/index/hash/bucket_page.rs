// Hash Bucket Page
//
// Leaf tier of the extendible hash index: a bounded list of key/value
// entries, bincode-encoded behind a fixed prefix.

use byteorder::{ByteOrder, LittleEndian};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::types::{Page, PAGE_SIZE};
use crate::index::hash::error::IndexError;
use crate::storage::page::PageType;

const TYPE_OFFSET: usize = 0;
const MAX_SIZE_OFFSET: usize = 4;
const ENTRIES_OFFSET: usize = 8;

#[derive(Debug)]
pub struct HashBucketPage<K, V> {
    max_size: u32,
    entries: Vec<(K, V)>,
}

impl<K, V> HashBucketPage<K, V>
where
    K: Serialize + DeserializeOwned + PartialEq,
    V: Serialize + DeserializeOwned + Clone,
{
    pub fn new(max_size: u32) -> Self {
        Self {
            max_size,
            entries: Vec::new(),
        }
    }

    pub fn load(page: &Page) -> Result<Self, IndexError> {
        if PageType::from_u32(LittleEndian::read_u32(&page.data[TYPE_OFFSET..]))
            != PageType::HashBucket
        {
            return Err(IndexError::WrongPageType);
        }
        let max_size = LittleEndian::read_u32(&page.data[MAX_SIZE_OFFSET..]);
        let entries = bincode::deserialize(&page.data[ENTRIES_OFFSET..])?;
        Ok(Self { max_size, entries })
    }

    pub fn store(&self, page: &mut Page) -> Result<(), IndexError> {
        let encoded = bincode::serialize(&self.entries)?;
        if ENTRIES_OFFSET + encoded.len() > PAGE_SIZE {
            return Err(IndexError::BucketOverflow);
        }
        LittleEndian::write_u32(
            &mut page.data[TYPE_OFFSET..TYPE_OFFSET + 4],
            PageType::HashBucket.to_u32(),
        );
        LittleEndian::write_u32(&mut page.data[MAX_SIZE_OFFSET..MAX_SIZE_OFFSET + 4], self.max_size);
        page.data[ENTRIES_OFFSET..ENTRIES_OFFSET + encoded.len()].copy_from_slice(&encoded);
        // Stale entry bytes from a previously fuller bucket must not survive.
        page.data[ENTRIES_OFFSET + encoded.len()..].fill(0);
        Ok(())
    }

    pub fn lookup(&self, key: &K) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Insert an entry. Returns false when the bucket is full or the key is
    /// already present.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        if self.is_full() || self.lookup(&key).is_some() {
            return false;
        }
        self.entries.push((key, value));
        true
    }

    pub fn remove(&mut self, key: &K) -> bool {
        match self.entries.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() as u32 >= self.max_size
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Drain all entries for a rehash during a bucket split.
    pub fn take_entries(&mut self) -> Vec<(K, V)> {
        std::mem::take(&mut self.entries)
    }

    pub fn set_entries(&mut self, entries: Vec<(K, V)>) {
        self.entries = entries;
    }

    /// Append without capacity or duplicate checks; split bookkeeping only.
    pub fn push(&mut self, key: K, value: V) {
        self.entries.push((key, value));
    }
}
