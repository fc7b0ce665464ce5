//! Byte-bounded LRU cache of decoded raster chunks.
//!
//! Each [`crate::source::GeoTiffSource`] owns one cache keyed by the strip or
//! tile index within its image, so neighbouring output blocks that fall into
//! the same chunk only decode it once. Chunks keep their stored sample type.
//!
//! Output blocks are produced top to bottom, so a source drops the chunks
//! that lie wholly above its current read with [`ChunkCache::evict_before`].
//! What stays resident is bounded by one row of chunks, not the raster.

use lru::LruCache;
use std::sync::Arc;

/// Default budget per source
pub const DEFAULT_CACHE_CAPACITY_BYTES: usize = 16 * 1024 * 1024;

/// Samples of one decoded chunk, pixel interleaved
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkData {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl ChunkData {
    /// Number of samples
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            ChunkData::U8(v) => v.len(),
            ChunkData::U16(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes held by the samples
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        match self {
            ChunkData::U8(v) => v.len(),
            ChunkData::U16(v) => v.len() * std::mem::size_of::<u16>(),
        }
    }

    /// Sample `index` widened to `f32`
    #[inline]
    #[must_use]
    pub fn sample(&self, index: usize) -> Option<f32> {
        match self {
            ChunkData::U8(v) => v.get(index).copied().map(f32::from),
            ChunkData::U16(v) => v.get(index).copied().map(f32::from),
        }
    }
}

struct CacheEntry {
    data: Arc<ChunkData>,
    size_bytes: usize,
}

/// LRU of decoded chunks, evicting least recently used entries once the
/// total size exceeds the byte budget.
pub struct ChunkCache {
    current_bytes: usize,
    capacity_bytes: usize,
    entries: LruCache<u32, CacheEntry>,
    hits: usize,
    misses: usize,
}

impl ChunkCache {
    #[must_use]
    pub fn new(capacity_bytes: usize) -> Self {
        ChunkCache {
            current_bytes: 0,
            capacity_bytes,
            entries: LruCache::unbounded(),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a chunk, marking it most recently used
    pub fn get(&mut self, index: u32) -> Option<Arc<ChunkData>> {
        let found = self.entries.get(&index).map(|entry| Arc::clone(&entry.data));
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    #[must_use]
    pub fn contains(&self, index: u32) -> bool {
        self.entries.contains(&index)
    }

    /// Insert a decoded chunk. Chunks larger than the whole budget are not
    /// cached.
    pub fn insert(&mut self, index: u32, data: Arc<ChunkData>) {
        let size_bytes = data.size_bytes();
        if size_bytes > self.capacity_bytes {
            return;
        }

        if let Some(old) = self.entries.pop(&index) {
            self.current_bytes = self.current_bytes.saturating_sub(old.size_bytes);
        }

        while self.current_bytes + size_bytes > self.capacity_bytes {
            if let Some((_index, entry)) = self.entries.pop_lru() {
                self.current_bytes = self.current_bytes.saturating_sub(entry.size_bytes);
            } else {
                break;
            }
        }

        self.current_bytes = self.current_bytes.saturating_add(size_bytes);
        self.entries.put(index, CacheEntry { data, size_bytes });
    }

    /// Drop every chunk whose index is below `index`.
    ///
    /// Returns the number of chunks dropped.
    pub fn evict_before(&mut self, index: u32) -> usize {
        let stale: Vec<u32> = self.entries.iter().map(|(k, _)| *k).filter(|k| *k < index).collect();
        for key in &stale {
            if let Some(entry) = self.entries.pop(key) {
                self.current_bytes = self.current_bytes.saturating_sub(entry.size_bytes);
            }
        }
        stale.len()
    }

    /// Bytes currently held
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.current_bytes
    }

    #[must_use]
    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` of [`ChunkCache::get`]
    #[must_use]
    pub fn hit_stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }
}

impl Default for ChunkCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY_BYTES)
    }
}

impl std::fmt::Debug for ChunkCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkCache")
            .field("entries", &self.entries.len())
            .field("current_bytes", &self.current_bytes)
            .field("capacity_bytes", &self.capacity_bytes)
            .finish_non_exhaustive()
    }
}
