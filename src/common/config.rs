/// Buffer pool sizing knobs.
#[derive(Debug, Clone, Copy)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool
    pub pool_size: usize,
    /// K value for the LRU-K replacer
    pub replacer_k: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 64,
            replacer_k: 2,
        }
    }
}

/// Extendible hash table shape. Depths are bit counts; they are bounded by
/// what fits on a single page (see the hash page layouts).
#[derive(Debug, Clone, Copy)]
pub struct HashTableConfig {
    /// Bits of the hash used by the header page to pick a directory
    pub header_max_depth: u32,
    /// Upper bound on a directory page's global depth
    pub directory_max_depth: u32,
    /// Maximum number of entries in a bucket page
    pub bucket_max_size: u32,
}

impl Default for HashTableConfig {
    fn default() -> Self {
        Self {
            header_max_depth: 2,
            directory_max_depth: 9,
            bucket_max_size: 64,
        }
    }
}
