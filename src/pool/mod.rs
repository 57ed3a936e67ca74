//! Self-calibrating buffer pool
//!
//! [`AdaptivePool`] sits in front of a [`SlabStore`] and learns which buffer
//! size to hand out. Every `put` records the size of the returned buffer in a
//! per-class histogram. Once any class has been observed more than
//! `calibrate_threshold` times, the histogram is drained and two percentiles
//! are recomputed:
//!
//! - the **serve size**, used to size buffers returned by `get`;
//! - the **discard size**, the largest capacity `put` hands back to the store.
//!   Anything larger is dropped so rare outliers cannot pin memory.
//!
//! The pool itself takes no locks. Histogram counters, the single-flight flag
//! and both derived sizes are atomics; readers may see the sizes from two
//! different passes across two loads, which is harmless.

pub mod calibration;
pub mod metrics;
pub mod registry;

pub use calibration::Calibration;
pub use registry::{PoolRegistry, DEFAULT_POOL};

use crate::buffer::Buffer;
use crate::config::PoolConfig;
use crate::slab::size_class::{class_of, NUM_CLASSES};
use crate::slab::SlabStore;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Label of pools created without a name
pub const ANONYMOUS_POOL: &str = "anonymous";

/// Byte buffer pool that calibrates its buffer size from observed usage.
///
/// Use one pool per kind of payload (e.g. one for JSON responses, one for log
/// lines) so each learns its own distribution.
pub struct AdaptivePool {
    name: String,
    store: Arc<SlabStore>,
    config: PoolConfig,
    /// Observations per size class since the last calibration
    calls: [AtomicU64; NUM_CLASSES],
    /// Single-flight guard for `calibrate`
    calibrating: AtomicBool,
    /// 0 until the first calibration
    serve_size: AtomicUsize,
    /// 0 until the first calibration (no ceiling)
    discard_size: AtomicUsize,
    counters: PoolCounters,
}

impl Default for AdaptivePool {
    fn default() -> Self {
        Self::new(Arc::new(SlabStore::default()))
    }
}

impl AdaptivePool {
    /// Create a pool with default tuning on top of `store`
    pub fn new(store: Arc<SlabStore>) -> Self {
        Self::with_config(store, PoolConfig::default())
    }

    /// Create a pool with custom tuning on top of `store`.
    ///
    /// The pool is labelled [`ANONYMOUS_POOL`] in logs and metrics.
    pub fn with_config(store: Arc<SlabStore>, config: PoolConfig) -> Self {
        Self::named(ANONYMOUS_POOL, store, config)
    }

    /// Create a named pool with custom tuning on top of `store`
    pub fn named(name: impl Into<String>, store: Arc<SlabStore>, config: PoolConfig) -> Self {
        let pool = Self {
            name: name.into(),
            store,
            config: config.normalized(),
            calls: std::array::from_fn(|_| AtomicU64::new(0)),
            calibrating: AtomicBool::new(false),
            serve_size: AtomicUsize::new(0),
            discard_size: AtomicUsize::new(0),
            counters: PoolCounters::default(),
        };
        info!(
            pool = %pool.name,
            serve_percentile = pool.config.serve_percentile,
            discard_percentile = pool.config.discard_percentile,
            calibrate_threshold = pool.config.calibrate_threshold,
            "Created adaptive pool"
        );
        pool
    }

    /// Rename the pool used in logs and metric labels
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        debug!(from = %self.name, to = %name, "Renamed adaptive pool");
        self.name = name;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Store backing this pool
    pub fn store(&self) -> &Arc<SlabStore> {
        &self.store
    }

    /// Get an empty buffer with room for at least [`serve_size`](Self::serve_size) bytes
    pub fn get(&self) -> Buffer {
        self.counters.gets.fetch_add(1, Ordering::Relaxed);
        self.store.get_empty(self.serve_size())
    }

    /// Return a buffer, recording its size.
    ///
    /// The buffer goes back to the store unless its capacity exceeds the
    /// current discard size, in which case it is simply dropped.
    pub fn put(&self, mut buf: Buffer) {
        self.recycle(&mut buf);
    }

    /// Like [`put`](Self::put), but leaves a released handle behind.
    ///
    /// # Panics
    ///
    /// If `buf` was already released.
    pub fn recycle(&self, buf: &mut Buffer) {
        assert!(
            !buf.is_released(),
            "bufpool: Buffer returned to the pool twice"
        );
        self.counters.puts.fetch_add(1, Ordering::Relaxed);

        let observed = match buf.len() {
            0 => buf.capacity(),
            len => len,
        };
        let idx = class_of(observed);
        if self.calls[idx].fetch_add(1, Ordering::Relaxed) + 1 > self.config.calibrate_threshold {
            self.calibrate();
        }

        let discard_size = self.discard_size.load(Ordering::Acquire);
        let capacity = buf.capacity();
        if discard_size == 0 || capacity <= discard_size {
            self.store.recycle(buf);
        } else {
            buf.take_storage();
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            metrics::record_discard(&self.name);
            trace!(pool = %self.name, capacity, discard_size, "Discarded oversized buffer");
        }
    }

    /// Size `get` currently hands out.
    ///
    /// Before the first calibration this is the size of the smallest class
    /// observed so far, or `default_size` when nothing has been observed.
    pub fn serve_size(&self) -> usize {
        let size = self.serve_size.load(Ordering::Acquire);
        if size > 0 {
            return size;
        }

        self.calls
            .iter()
            .position(|calls| calls.load(Ordering::Relaxed) > 0)
            .map(crate::slab::size_class::size_of)
            .unwrap_or(self.config.default_size)
    }

    /// Capacity ceiling for recycled buffers, `None` before the first calibration
    pub fn discard_size(&self) -> Option<usize> {
        match self.discard_size.load(Ordering::Acquire) {
            0 => None,
            size => Some(size),
        }
    }

    /// True once a calibration pass has published sizes
    pub fn is_calibrated(&self) -> bool {
        self.serve_size.load(Ordering::Acquire) > 0
    }

    /// Run a calibration pass now.
    ///
    /// Returns `None` without blocking if another pass is in flight, or when
    /// nothing was observed since the last pass (sizes stay unchanged).
    pub fn calibrate(&self) -> Option<Calibration> {
        if self
            .calibrating
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return None;
        }

        let mut calls = [0u64; NUM_CLASSES];
        for (slot, counter) in calls.iter_mut().zip(&self.calls) {
            *slot = counter.swap(0, Ordering::Relaxed);
        }

        let calibration = Calibration::from_calls(
            &calls,
            self.config.serve_percentile,
            self.config.discard_percentile,
        );
        if let Some(c) = calibration {
            self.serve_size.store(c.serve_size, Ordering::Release);
            self.discard_size.store(c.discard_size, Ordering::Release);
            self.counters.calibrations.fetch_add(1, Ordering::Relaxed);
            metrics::record_calibration(&self.name, &c);
            debug!(
                pool = %self.name,
                serve_size = c.serve_size,
                discard_size = c.discard_size,
                total_calls = c.total_calls,
                "Calibrated pool"
            );
        }

        self.calibrating.store(false, Ordering::Release);
        calibration
    }

    /// Snapshot of counters and current sizes
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            name: self.name.clone(),
            gets: self.counters.gets.load(Ordering::Relaxed),
            puts: self.counters.puts.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
            calibrations: self.counters.calibrations.load(Ordering::Relaxed),
            serve_size: self.serve_size(),
            discard_size: self.discard_size(),
            pending_calls: self
                .calls
                .iter()
                .map(|calls| calls.load(Ordering::Relaxed))
                .collect(),
        }
    }
}

#[derive(Default)]
struct PoolCounters {
    gets: AtomicU64,
    puts: AtomicU64,
    discarded: AtomicU64,
    calibrations: AtomicU64,
}

/// Pool statistics
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub name: String,
    pub gets: u64,
    pub puts: u64,
    /// Buffers dropped for exceeding the discard size
    pub discarded: u64,
    pub calibrations: u64,
    pub serve_size: usize,
    pub discard_size: Option<usize>,
    /// Histogram accumulated since the last calibration
    pub pending_calls: Vec<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SIZE;

    fn pool_with_threshold(threshold: u64) -> AdaptivePool {
        AdaptivePool::with_config(
            Arc::new(SlabStore::new()),
            PoolConfig {
                calibrate_threshold: threshold,
                ..PoolConfig::default()
            },
        )
    }

    fn cycle(pool: &AdaptivePool, n: usize) {
        let mut buf = pool.get();
        buf.resize(n, 0);
        pool.put(buf);
    }

    #[test]
    fn test_unnamed_pools_do_not_claim_default_label() {
        assert_eq!(AdaptivePool::default().name(), ANONYMOUS_POOL);
        assert_eq!(pool_with_threshold(10).name(), ANONYMOUS_POOL);
        assert_ne!(ANONYMOUS_POOL, DEFAULT_POOL);

        let named = AdaptivePool::named("json", Arc::new(SlabStore::new()), PoolConfig::default());
        assert_eq!(named.name(), "json");
        assert_eq!(named.with_name("logs").name(), "logs");
    }

    #[test]
    fn test_default_size_before_observations() {
        let pool = AdaptivePool::default();
        assert_eq!(pool.serve_size(), DEFAULT_SIZE);
        assert_eq!(pool.discard_size(), None);
        assert!(!pool.is_calibrated());

        let buf = pool.get();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), DEFAULT_SIZE);
    }

    #[test]
    fn test_first_observation_used_before_calibration() {
        let pool = AdaptivePool::default();
        cycle(&pool, 300);

        assert_eq!(pool.serve_size(), 512);
        assert!(!pool.is_calibrated());
    }

    #[test]
    fn test_empty_buffer_observed_by_capacity() {
        let pool = pool_with_threshold(1);
        pool.put(pool.store().get_empty(5000));
        pool.put(pool.store().get_empty(5000));

        // both observations landed in the 8 KiB class
        let stats = pool.stats();
        assert_eq!(stats.calibrations, 1);
        assert_eq!(pool.serve_size(), 8192);
    }

    #[test]
    fn test_calibration_triggered_by_threshold() {
        let pool = pool_with_threshold(100);
        for _ in 0..100 {
            cycle(&pool, 1000);
        }
        assert!(!pool.is_calibrated());

        cycle(&pool, 1000);
        assert!(pool.is_calibrated());
        assert_eq!(pool.serve_size(), 1024);
        assert_eq!(pool.discard_size(), Some(1024));
        assert!(pool.stats().pending_calls.iter().all(|&n| n == 0));
    }

    #[test]
    fn test_calibrate_empty_histogram_keeps_sizes() {
        let pool = pool_with_threshold(10);
        for _ in 0..11 {
            cycle(&pool, 3000);
        }
        assert_eq!(pool.serve_size(), 4096);

        assert!(pool.calibrate().is_none());
        assert_eq!(pool.serve_size(), 4096);
        assert_eq!(pool.discard_size(), Some(4096));
    }

    #[test]
    fn test_single_flight() {
        let pool = pool_with_threshold(1000);
        cycle(&pool, 100);

        pool.calibrating.store(true, Ordering::SeqCst);
        assert!(pool.calibrate().is_none());
        // histogram untouched while another pass holds the flag
        assert_eq!(pool.stats().pending_calls.iter().sum::<u64>(), 1);

        pool.calibrating.store(false, Ordering::SeqCst);
        assert!(pool.calibrate().is_some());
    }

    #[test]
    fn test_discard_oversized() {
        let pool = pool_with_threshold(10);
        for _ in 0..11 {
            cycle(&pool, 1000);
        }
        assert_eq!(pool.discard_size(), Some(1024));

        let before = pool.store().stats().free_buffers;
        let mut big = pool.get();
        big.resize(100_000, 0);
        pool.put(big);

        assert_eq!(pool.store().stats().free_buffers, before - 1);
        assert_eq!(pool.stats().discarded, 1);
    }

    #[test]
    fn test_recycle_leaves_tombstone() {
        let pool = AdaptivePool::default();
        let mut buf = pool.get();
        buf.write_bytes(b"abc");
        pool.recycle(&mut buf);

        assert!(buf.is_released());
        assert_eq!(buf.len(), Buffer::RELEASED);
    }

    #[test]
    #[should_panic(expected = "twice")]
    fn test_put_released_panics() {
        let pool = AdaptivePool::default();
        let mut buf = pool.get();
        pool.recycle(&mut buf);
        pool.put(buf);
    }
}
