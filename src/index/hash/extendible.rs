// Disk Extendible Hash Table
//
// Three page tiers served by the buffer pool: a header page routing the
// top bits of the hash to a directory, directory pages routing the low
// bits to buckets, and bucket pages holding the entries. Lookups crab
// read latches downward; inserts and removes hold write latches on the
// pages they restructure.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::config::HashTableConfig;
use crate::common::types::{PageId, INVALID_PAGE_ID};
use crate::index::hash::bucket_page::HashBucketPage;
use crate::index::hash::directory_page::{HashDirectoryPage, HASH_DIRECTORY_MAX_DEPTH};
use crate::index::hash::error::IndexError;
use crate::index::hash::header_page::{HashHeaderPage, HASH_HEADER_MAX_DEPTH};
use crate::storage::buffer::BufferPoolManager;

/// Default key hash: DefaultHasher truncated to 32 bits.
pub fn default_hash<K: Hash>(key: &K) -> u32 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish() as u32
}

type HashFn<K> = Box<dyn Fn(&K) -> u32 + Send + Sync>;

pub struct DiskExtendibleHashTable<K, V> {
    name: String,
    bpm: Arc<BufferPoolManager>,
    header_page_id: PageId,
    directory_max_depth: u32,
    bucket_max_size: u32,
    hash_fn: HashFn<K>,
    _marker: PhantomData<fn(K) -> V>,
}

impl<K, V> DiskExtendibleHashTable<K, V>
where
    K: Serialize + DeserializeOwned + PartialEq + Clone + 'static,
    V: Serialize + DeserializeOwned + Clone,
{
    pub fn new(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        config: HashTableConfig,
    ) -> Result<Self, IndexError>
    where
        K: Hash,
    {
        Self::with_hasher(name, bpm, config, Box::new(default_hash::<K>))
    }

    /// Construct with an explicit hash function (tests use identity-style
    /// hashes to steer keys into chosen buckets).
    pub fn with_hasher(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        config: HashTableConfig,
        hash_fn: HashFn<K>,
    ) -> Result<Self, IndexError> {
        if config.header_max_depth > HASH_HEADER_MAX_DEPTH {
            return Err(IndexError::DepthTooLarge(config.header_max_depth));
        }
        if config.directory_max_depth > HASH_DIRECTORY_MAX_DEPTH {
            return Err(IndexError::DepthTooLarge(config.directory_max_depth));
        }

        let name = name.into();
        let guard = bpm.new_page_guarded()?;
        let header_page_id = guard.page_id();
        {
            let mut page = guard.upgrade_write();
            HashHeaderPage::init(&mut page, config.header_max_depth);
        }
        debug!(
            "created hash table {:?} with header page {}",
            name, header_page_id
        );
        Ok(Self {
            name,
            bpm,
            header_page_id,
            directory_max_depth: config.directory_max_depth,
            bucket_max_size: config.bucket_max_size,
            hash_fn,
            _marker: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    /// Point lookup. Read latches crab downward: each parent latch drops as
    /// soon as the child page id is known.
    pub fn get(&self, key: &K) -> Result<Option<V>, IndexError> {
        let hash = (self.hash_fn)(key);

        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let header = HashHeaderPage::load(&header_guard)?;
        let directory_page_id = header.directory_page_id(header.hash_to_directory_index(hash));
        if directory_page_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let directory_guard = self.bpm.fetch_page_read(directory_page_id)?;
        drop(header_guard);
        let directory = HashDirectoryPage::load(&directory_guard)?;
        let bucket_page_id = directory.bucket_page_id(directory.hash_to_bucket_index(hash));
        if bucket_page_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let bucket_guard = self.bpm.fetch_page_read(bucket_page_id)?;
        drop(directory_guard);
        let bucket = HashBucketPage::<K, V>::load(&bucket_guard)?;
        Ok(bucket.lookup(key).cloned())
    }

    /// Insert a key/value pair. Returns false on duplicate key, or when the
    /// owning bucket cannot be split further (directory pinned at its
    /// maximum depth).
    pub fn insert(&self, key: &K, value: &V) -> Result<bool, IndexError> {
        let hash = (self.hash_fn)(key);

        let mut header_guard = self.bpm.fetch_page_write(self.header_page_id)?;
        let mut header = HashHeaderPage::load(&header_guard)?;
        let directory_idx = header.hash_to_directory_index(hash);
        let directory_page_id = header.directory_page_id(directory_idx);

        if directory_page_id == INVALID_PAGE_ID {
            // First key routed here: materialize the directory and its
            // initial bucket while still holding the header latch.
            let directory_guard = self.bpm.new_page_guarded()?;
            let directory_page_id = directory_guard.page_id();
            let mut directory_guard = directory_guard.upgrade_write();
            header.set_directory_page_id(directory_idx, directory_page_id);
            header.store(&mut header_guard);
            drop(header_guard);

            let bucket_guard = self.bpm.new_page_guarded()?;
            let bucket_page_id = bucket_guard.page_id();
            let mut bucket_guard = bucket_guard.upgrade_write();
            let mut bucket = HashBucketPage::<K, V>::new(self.bucket_max_size);
            let inserted = bucket.insert(key.clone(), value.clone());
            bucket.store(&mut bucket_guard)?;

            let mut directory = HashDirectoryPage::new(self.directory_max_depth);
            directory.set_bucket_page_id(0, bucket_page_id);
            directory.store(&mut directory_guard);
            return Ok(inserted);
        }
        drop(header_guard);

        let mut directory_guard = self.bpm.fetch_page_write(directory_page_id)?;
        let mut directory = HashDirectoryPage::load(&directory_guard)?;
        let mut bucket_idx = directory.hash_to_bucket_index(hash);
        let mut bucket_guard = self.bpm.fetch_page_write(directory.bucket_page_id(bucket_idx))?;
        let mut bucket = HashBucketPage::<K, V>::load(&bucket_guard)?;

        if bucket.lookup(key).is_some() {
            return Ok(false);
        }

        // Split until the owning bucket has room. A single split may leave
        // the bucket full when every key collapses onto one side.
        while bucket.is_full() {
            if directory.local_depth(bucket_idx) == directory.global_depth() {
                if directory.global_depth() == directory.max_depth() {
                    directory.store(&mut directory_guard);
                    return Ok(false);
                }
                directory.incr_global_depth();
                bucket_idx = directory.hash_to_bucket_index(hash);
            }

            let new_bucket_guard = self.bpm.new_page_guarded()?;
            let new_bucket_page_id = new_bucket_guard.page_id();
            let mut new_bucket_guard = new_bucket_guard.upgrade_write();
            let mut new_bucket = HashBucketPage::<K, V>::new(self.bucket_max_size);

            // Repoint every slot of the overflowing bucket's family: the
            // half with the new bit set moves to the new bucket, both
            // halves deepen.
            let old_local = directory.local_depth(bucket_idx);
            let new_local = (old_local + 1) as u8;
            let family_mask = (1usize << old_local) - 1;
            let family_base = bucket_idx & family_mask;
            for slot in 0..directory.size() {
                if slot & family_mask != family_base {
                    continue;
                }
                if (slot >> old_local) & 1 == 1 {
                    directory.set_bucket_page_id(slot, new_bucket_page_id);
                }
                directory.set_local_depth(slot, new_local);
            }

            // Rehash the old bucket; entries now routed to the new bucket
            // move over.
            let mut kept = Vec::new();
            for (k, v) in bucket.take_entries() {
                let idx = directory.hash_to_bucket_index((self.hash_fn)(&k));
                if directory.bucket_page_id(idx) == new_bucket_page_id {
                    new_bucket.push(k, v);
                } else {
                    kept.push((k, v));
                }
            }
            bucket.set_entries(kept);
            bucket.store(&mut bucket_guard)?;
            new_bucket.store(&mut new_bucket_guard)?;

            bucket_idx = directory.hash_to_bucket_index(hash);
            if directory.bucket_page_id(bucket_idx) == new_bucket_page_id {
                bucket_guard = new_bucket_guard;
                bucket = new_bucket;
            }
        }

        let inserted = bucket.insert(key.clone(), value.clone());
        bucket.store(&mut bucket_guard)?;
        directory.store(&mut directory_guard);
        Ok(inserted)
    }

    /// Remove a key. Empty buckets merge with their split image while the
    /// depths allow, and the directory halves when no slot needs its last
    /// bit. Removing an absent key leaves every page untouched.
    pub fn remove(&self, key: &K) -> Result<bool, IndexError> {
        let hash = (self.hash_fn)(key);

        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let header = HashHeaderPage::load(&header_guard)?;
        let directory_page_id = header.directory_page_id(header.hash_to_directory_index(hash));
        drop(header_guard);
        if directory_page_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        let mut directory_guard = self.bpm.fetch_page_write(directory_page_id)?;
        let mut directory = HashDirectoryPage::load(&directory_guard)?;
        let mut bucket_idx = directory.hash_to_bucket_index(hash);
        let mut bucket_guard = self.bpm.fetch_page_write(directory.bucket_page_id(bucket_idx))?;
        let mut bucket = HashBucketPage::<K, V>::load(&bucket_guard)?;

        if !bucket.remove(key) {
            return Ok(false);
        }
        bucket.store(&mut bucket_guard)?;

        loop {
            if directory.global_depth() == 0 {
                break;
            }
            let local = directory.local_depth(bucket_idx);
            if local == 0 {
                break;
            }
            let image_idx = HashDirectoryPage::split_image_index(bucket_idx, local);
            if directory.local_depth(image_idx) != local {
                break;
            }
            let bucket_page_id = directory.bucket_page_id(bucket_idx);
            let image_page_id = directory.bucket_page_id(image_idx);
            if bucket_page_id == image_page_id {
                break;
            }

            // Pick the side to dissolve; swap roles when only the image is
            // empty so the loop can continue.
            let (dead_page_id, survivor_page_id) = if bucket.is_empty() {
                (bucket_page_id, image_page_id)
            } else {
                let image_guard = self.bpm.fetch_page_write(image_page_id)?;
                let image_bucket = HashBucketPage::<K, V>::load(&image_guard)?;
                if image_bucket.is_empty() {
                    (image_page_id, bucket_page_id)
                } else {
                    break;
                }
            };

            let merged_mask = (1usize << (local - 1)) - 1;
            let merged_base = bucket_idx & merged_mask;
            for slot in 0..directory.size() {
                if slot & merged_mask != merged_base {
                    continue;
                }
                directory.set_bucket_page_id(slot, survivor_page_id);
                directory.set_local_depth(slot, (local - 1) as u8);
            }

            drop(bucket_guard);
            if let Err(e) = self.bpm.delete_page(dead_page_id) {
                warn!(
                    "hash table {}: could not reclaim merged bucket page {}: {}",
                    self.name, dead_page_id, e
                );
            }

            if directory.can_shrink() {
                directory.decr_global_depth();
            }

            bucket_idx = merged_base;
            bucket_guard = self.bpm.fetch_page_write(survivor_page_id)?;
            bucket = HashBucketPage::<K, V>::load(&bucket_guard)?;
        }

        directory.store(&mut directory_guard);
        Ok(true)
    }

}
