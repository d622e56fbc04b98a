//! Tile cache with SIEVE eviction.
//!
//! Each slot carries a "visited" flag instead of a recency order:
//!
//! - On access: set the visited flag
//! - On eviction: sweep a hand over the slots; a visited slot gets its flag
//!   cleared and a second chance, the first unvisited slot is evicted
//!
//! Dirty buckets are written back to the file when evicted and on flush.
//! Buckets that were never written read as zeros.

use super::bucket_file::BucketFile;
use crate::Result;
use core::fmt;
use std::collections::HashMap;

/// Log target for tiled storage
const LOG_TARGET: &str = "       tsm";

#[derive(Debug)]
struct Slot {
    bucket_nr: u64,
    visited: bool,
    dirty: bool,
    data: Box<[u8]>,
}

/// Access counters of a [`BucketCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub reads: u64,
    pub writes: u64,
}

impl fmt::Display for CacheStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits: {}, misses: {}, reads: {}, writes: {}",
            self.hits, self.misses, self.reads, self.writes
        )
    }
}

/// Caches the buckets of one hypercube, located at `base_offset + nr * bucket_size`.
#[derive(Debug)]
pub struct BucketCache {
    bucket_size: usize,
    base_offset: u64,
    capacity: usize,
    slots: Vec<Slot>,
    index: HashMap<u64, usize>,
    hand: usize,
    stats: CacheStatistics,
}

impl BucketCache {
    /// A cache of `capacity` slots (at least one).
    #[must_use]
    pub fn new(bucket_size: usize, base_offset: u64, capacity: usize) -> Self {
        Self {
            bucket_size,
            base_offset,
            capacity: capacity.max(1),
            slots: Vec::new(),
            index: HashMap::new(),
            hand: 0,
            stats: CacheStatistics::default(),
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub const fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub const fn statistics(&self) -> CacheStatistics {
        self.stats
    }

    /// Read access to a bucket, loading it if needed.
    pub fn get(&mut self, file: &mut BucketFile, bucket_nr: u64) -> Result<&[u8]> {
        let idx = self.slot_for(file, bucket_nr)?;
        Ok(&*self.slots[idx].data)
    }

    /// Write access to a bucket; the bucket is written back later.
    pub fn get_mut(&mut self, file: &mut BucketFile, bucket_nr: u64) -> Result<&mut [u8]> {
        let idx = self.slot_for(file, bucket_nr)?;
        let slot = &mut self.slots[idx];
        slot.dirty = true;
        Ok(&mut *slot.data)
    }

    /// Write all dirty buckets back to the file.
    pub fn flush(&mut self, file: &mut BucketFile) -> Result<()> {
        for slot in &mut self.slots {
            if slot.dirty {
                file.write_at(self.base_offset + slot.bucket_nr * self.bucket_size as u64, &slot.data)?;
                slot.dirty = false;
                self.stats.writes += 1;
            }
        }
        Ok(())
    }

    /// Flush and drop all cached buckets.
    pub fn clear(&mut self, file: &mut BucketFile) -> Result<()> {
        self.flush(file)?;
        self.slots.clear();
        self.index.clear();
        self.hand = 0;
        Ok(())
    }

    /// Change the number of slots.
    ///
    /// Shrinking only happens when `force_smaller` is set; it flushes and
    /// empties the cache first.
    pub fn resize(&mut self, file: &mut BucketFile, capacity: usize, force_smaller: bool) -> Result<()> {
        let capacity = capacity.max(1);
        if capacity < self.capacity {
            if !force_smaller {
                return Ok(());
            }
            if self.slots.len() > capacity {
                self.clear(file)?;
            }
        }

        log::debug!(target: LOG_TARGET, "Resizing tile cache from {} to {capacity} slots", self.capacity);
        self.capacity = capacity;
        Ok(())
    }

    fn slot_for(&mut self, file: &mut BucketFile, bucket_nr: u64) -> Result<usize> {
        if let Some(&idx) = self.index.get(&bucket_nr) {
            self.stats.hits += 1;
            self.slots[idx].visited = true;
            return Ok(idx);
        }

        self.stats.misses += 1;

        let idx = if self.slots.len() < self.capacity {
            self.slots.push(Slot {
                bucket_nr,
                visited: false,
                dirty: false,
                data: vec![0; self.bucket_size].into_boxed_slice(),
            });
            self.slots.len() - 1
        } else {
            let idx = self.evict(file)?;
            let slot = &mut self.slots[idx];
            slot.bucket_nr = bucket_nr;
            slot.visited = false;
            slot.dirty = false;
            idx
        };

        let offset = self.base_offset + bucket_nr * self.bucket_size as u64;
        file.read_at(offset, &mut self.slots[idx].data)?;
        self.stats.reads += 1;

        let _ = self.index.insert(bucket_nr, idx);
        Ok(idx)
    }

    /// Pick a victim slot, writing it back when dirty; returns its index.
    fn evict(&mut self, file: &mut BucketFile) -> Result<usize> {
        loop {
            if self.hand >= self.slots.len() {
                self.hand = 0;
            }

            let slot = &mut self.slots[self.hand];
            if slot.visited {
                slot.visited = false;
                self.hand += 1;
                continue;
            }

            if slot.dirty {
                file.write_at(self.base_offset + slot.bucket_nr * self.bucket_size as u64, &slot.data)?;
                slot.dirty = false;
                self.stats.writes += 1;
            }

            let _ = self.index.remove(&slot.bucket_nr);
            let idx = self.hand;
            self.hand += 1;
            return Ok(idx);
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn make_file(dir: &tempfile::TempDir) -> BucketFile {
        BucketFile::create(dir.path().join("buckets")).unwrap()
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_unwritten_bucket_reads_zero() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut file = make_file(&temp_dir);
        let mut cache = BucketCache::new(8, 0, 2);

        assert_eq!(cache.get(&mut file, 5).unwrap(), &[0u8; 8]);
        assert_eq!(cache.statistics().misses, 1);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_hit_after_miss() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut file = make_file(&temp_dir);
        let mut cache = BucketCache::new(8, 0, 2);

        let _ = cache.get(&mut file, 0).unwrap();
        let _ = cache.get(&mut file, 0).unwrap();
        let stats = cache.statistics();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.reads, 1);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_dirty_bucket_written_on_eviction() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut file = make_file(&temp_dir);
        let mut cache = BucketCache::new(4, 16, 1);

        cache.get_mut(&mut file, 1).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        // evicts bucket 1
        let _ = cache.get(&mut file, 0).unwrap();
        assert_eq!(cache.statistics().writes, 1);

        let mut raw = [0u8; 4];
        file.read_at(20, &mut raw).unwrap();
        assert_eq!(raw, [1, 2, 3, 4]);

        assert_eq!(cache.get(&mut file, 1).unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_visited_bucket_gets_second_chance() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut file = make_file(&temp_dir);
        let mut cache = BucketCache::new(4, 0, 2);

        let _ = cache.get(&mut file, 0).unwrap();
        let _ = cache.get(&mut file, 1).unwrap();
        // mark bucket 0 visited
        let _ = cache.get(&mut file, 0).unwrap();
        // must evict bucket 1, the only unvisited one
        let _ = cache.get(&mut file, 2).unwrap();

        let before = cache.statistics().hits;
        let _ = cache.get(&mut file, 0).unwrap();
        assert_eq!(cache.statistics().hits, before + 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_flush_and_clear() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut file = make_file(&temp_dir);
        let mut cache = BucketCache::new(2, 0, 4);

        cache.get_mut(&mut file, 0).unwrap().copy_from_slice(&[9, 9]);
        cache.flush(&mut file).unwrap();
        cache.flush(&mut file).unwrap();
        assert_eq!(cache.statistics().writes, 1);

        cache.clear(&mut file).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&mut file, 0).unwrap(), &[9, 9]);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_resize_only_shrinks_when_forced() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut file = make_file(&temp_dir);
        let mut cache = BucketCache::new(2, 0, 4);

        cache.resize(&mut file, 2, false).unwrap();
        assert_eq!(cache.capacity(), 4);

        for nr in 0..4 {
            let _ = cache.get(&mut file, nr).unwrap();
        }
        cache.resize(&mut file, 2, true).unwrap();
        assert_eq!(cache.capacity(), 2);
        assert!(cache.is_empty());

        cache.resize(&mut file, 8, false).unwrap();
        assert_eq!(cache.capacity(), 8);
    }
}
