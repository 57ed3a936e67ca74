//! Size-classed buffer store
//!
//! Keeps idle buffers in one free list per size class. A buffer returned with
//! capacity `c` is filed under the largest class whose size does not exceed
//! `c`, so anything taken from class `i` can hold `size_of(i)` bytes without
//! growing.

use super::size_class::{
    class_of, fit_class_of, size_of, SizeClass, MAX_SIZE, MIN_SIZE, NUM_CLASSES,
};
use crate::buffer::Buffer;
use crate::config::StoreConfig;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, trace};

/// Slab store for byte buffers
///
/// Thread-safe; every size class is guarded by its own lock, so traffic on
/// different classes never contends.
pub struct SlabStore {
    /// Size classes (sorted by size)
    classes: Vec<SizeClass>,
    config: StoreConfig,
    counters: StoreCounters,
}

impl Default for SlabStore {
    fn default() -> Self {
        Self::with_config(StoreConfig::default())
    }
}

impl SlabStore {
    /// Create a store with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with custom limits
    pub fn with_config(config: StoreConfig) -> Self {
        info!(
            classes = NUM_CLASSES,
            min_size = MIN_SIZE,
            max_size = MAX_SIZE,
            max_pool_size = config.max_pool_size,
            max_free_per_class = config.max_free_per_class,
            "Initializing slab store"
        );

        Self {
            classes: (0..NUM_CLASSES).map(SizeClass::new).collect(),
            config,
            counters: StoreCounters::default(),
        }
    }

    /// Get a buffer holding `len` zero bytes
    pub fn get(&self, len: usize) -> Buffer {
        let mut buf = self.get_empty(len);
        buf.resize(len, 0);
        buf
    }

    /// Get an empty buffer able to hold at least `capacity` bytes.
    ///
    /// Reuses an idle buffer from the matching class or the one above it,
    /// otherwise allocates a buffer of the full class size.
    pub fn get_empty(&self, capacity: usize) -> Buffer {
        let idx = class_of(capacity);
        let reused = self.classes[idx]
            .take()
            .or_else(|| self.classes.get(idx + 1).and_then(SizeClass::take));

        match reused {
            Some(mut storage) => {
                storage.clear();
                if storage.capacity() < capacity {
                    storage.reserve_exact(capacity);
                }
                self.counters.reuses.fetch_add(1, Ordering::Relaxed);
                Buffer::new(storage)
            }
            None => {
                let size = if capacity > MAX_SIZE {
                    capacity
                } else {
                    size_of(idx).max(capacity)
                };
                self.counters.allocations.fetch_add(1, Ordering::Relaxed);
                trace!(requested = capacity, allocated = size, class = idx, "Allocated buffer");
                Buffer::with_capacity(size)
            }
        }
    }

    /// Wrap caller-provided storage in a buffer
    pub fn new_buffer(&self, initial: Vec<u8>) -> Buffer {
        Buffer::new(initial)
    }

    /// Return a buffer for reuse
    pub fn put(&self, mut buf: Buffer) {
        self.recycle(&mut buf);
    }

    /// Return a buffer's storage for reuse, leaving a released handle behind.
    ///
    /// Every later read or write through `buf` panics, until it is given new
    /// storage with [`Buffer::reset_with`].
    ///
    /// # Panics
    ///
    /// If `buf` was already released.
    pub fn recycle(&self, buf: &mut Buffer) {
        let Some(mut storage) = buf.take_storage() else {
            panic!("bufpool: Buffer returned to the pool twice");
        };

        let capacity = storage.capacity();
        if capacity < MIN_SIZE || capacity > self.config.max_pool_size {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(capacity, "Dropped buffer outside retained range");
            return;
        }

        storage.clear();
        let idx = fit_class_of(capacity);
        match self.classes[idx].give(storage, self.config.max_free_per_class) {
            Ok(()) => {
                self.counters.returned.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(capacity, class = idx, "Dropped buffer, free list full");
            }
        }
    }

    /// Release every idle buffer, returning the number of bytes freed
    pub fn shrink(&self) -> usize {
        let freed = self.classes.iter().map(SizeClass::drain).sum();
        info!(freed_bytes = freed, "Shrunk slab store");
        freed
    }

    /// Limits this store was built with
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Get statistics about the store
    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            allocations: self.counters.allocations.load(Ordering::Relaxed),
            reuses: self.counters.reuses.load(Ordering::Relaxed),
            returned: self.counters.returned.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            ..StoreStats::default()
        };

        for sc in &self.classes {
            let class_stats = SizeClassStats {
                index: sc.index,
                slot_size: sc.slot_size,
                free_buffers: sc.free_count(),
                free_bytes: sc.free_bytes(),
            };
            stats.free_buffers += class_stats.free_buffers;
            stats.free_bytes += class_stats.free_bytes;
            stats.size_classes.push(class_stats);
        }

        stats
    }
}

#[derive(Default)]
struct StoreCounters {
    allocations: AtomicU64,
    reuses: AtomicU64,
    returned: AtomicU64,
    dropped: AtomicU64,
}

/// Statistics for the slab store
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    /// Buffers allocated fresh
    pub allocations: u64,
    /// Requests served from a free list
    pub reuses: u64,
    /// Buffers accepted back into a free list
    pub returned: u64,
    /// Buffers refused on return
    pub dropped: u64,
    pub free_buffers: usize,
    pub free_bytes: usize,
    pub size_classes: Vec<SizeClassStats>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SizeClassStats {
    pub index: usize,
    pub slot_size: usize,
    pub free_buffers: usize,
    pub free_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_zero() {
        let store = SlabStore::new();
        store.put(store.new_buffer(Vec::new()));
        store.put(store.new_buffer(Vec::with_capacity(0)));

        let buf = store.get(0);
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), 64);
    }

    #[test]
    fn test_get_sets_length() {
        let store = SlabStore::new();
        let buf = store.get(1234);
        assert_eq!(buf.len(), 1234);
        assert_eq!(buf.capacity(), 2048);
        assert!(buf.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_reuse() {
        let store = SlabStore::new();

        let mut buf = store.get_empty(1000);
        buf.write_bytes(b"stale");
        store.put(buf);

        let again = store.get_empty(1000);
        assert!(again.is_empty());
        assert_eq!(again.capacity(), 1024);

        let stats = store.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.reuses, 1);
        assert_eq!(stats.returned, 1);
    }

    #[test]
    fn test_reuse_from_next_class() {
        let store = SlabStore::new();
        store.put(store.get_empty(2048));

        // class 4 is empty, class 5 holds the 2048 buffer
        let buf = store.get_empty(1024);
        assert_eq!(buf.capacity(), 2048);
        assert_eq!(store.stats().reuses, 1);
    }

    #[test]
    fn test_grown_buffer_filed_by_capacity() {
        let store = SlabStore::new();
        let mut buf = store.get_empty(64);
        buf.resize(3000, 1);
        let capacity = buf.capacity();
        store.put(buf);

        let stats = store.stats();
        let idx = fit_class_of(capacity);
        assert_eq!(stats.size_classes[idx].free_buffers, 1);
        assert!(store.get_empty(size_of(idx)).capacity() >= size_of(idx));
    }

    #[test]
    fn test_oversized_buffer_dropped() {
        let store = SlabStore::with_config(StoreConfig {
            max_pool_size: 4096,
            ..StoreConfig::default()
        });
        store.put(store.get_empty(8192));

        let stats = store.stats();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.free_buffers, 0);
    }

    #[test]
    fn test_free_list_limit() {
        let store = SlabStore::with_config(StoreConfig {
            max_free_per_class: 2,
            ..StoreConfig::default()
        });
        let bufs: Vec<_> = (0..3).map(|_| store.get_empty(100)).collect();
        for buf in bufs {
            store.put(buf);
        }

        let stats = store.stats();
        assert_eq!(stats.returned, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.free_buffers, 2);
    }

    #[test]
    fn test_use_after_recycle() {
        let store = SlabStore::new();
        let mut buf = store.get(10);
        store.recycle(&mut buf);

        assert_eq!(buf.len(), Buffer::RELEASED);
        assert_eq!(buf.capacity(), 64);

        let write = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| buf.write_byte(0)));
        assert!(write.is_err());
        let bytes = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| buf.as_bytes().len()));
        assert!(bytes.is_err());
        let text = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| buf.as_str().is_ok()));
        assert!(text.is_err());
    }

    #[test]
    #[should_panic(expected = "twice")]
    fn test_double_recycle_panics() {
        let store = SlabStore::new();
        let mut buf = store.get(10);
        store.recycle(&mut buf);
        store.recycle(&mut buf);
    }

    #[test]
    fn test_shrink() {
        let store = SlabStore::new();
        store.put(store.get_empty(100));
        store.put(store.get_empty(5000));

        assert!(store.shrink() >= 128 + 8192);
        let stats = store.stats();
        assert_eq!(stats.free_buffers, 0);
        assert_eq!(stats.free_bytes, 0);
    }
}
