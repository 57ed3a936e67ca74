//! Size class management for the slab store
//!
//! Sizes are bucketed into [`NUM_CLASSES`] power-of-two classes starting at
//! [`MIN_SIZE`]:
//!
//! ```text
//! class 0  → [0, 64]
//! class 1  → [65, 128]
//! class 2  → [129, 256]
//! ...
//! class 19 → [16 MiB + 1, ∞)   (nominal size 32 MiB)
//! ```

use parking_lot::Mutex;

/// log2 of [`MIN_SIZE`]
pub const MIN_BIT_SIZE: u32 = 6;

/// Number of size classes
pub const NUM_CLASSES: usize = 20;

/// Smallest class size, one CPU cache line
pub const MIN_SIZE: usize = 1 << MIN_BIT_SIZE;

/// Nominal size of the top class (32 MiB)
pub const MAX_SIZE: usize = 1 << (MIN_BIT_SIZE as usize + NUM_CLASSES - 1);

/// Largest buffer capacity the slab store will retain (64 MiB)
pub const MAX_POOL_SIZE: usize = MAX_SIZE << 1;

/// Map a byte count to its size class.
///
/// `0..=64` is class 0, `65..=128` class 1 and so on; anything above
/// [`MAX_SIZE`] lands in the top class.
#[inline]
pub const fn class_of(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let scaled = (n - 1) >> MIN_BIT_SIZE;
    let idx = (usize::BITS - scaled.leading_zeros()) as usize;
    if idx >= NUM_CLASSES {
        NUM_CLASSES - 1
    } else {
        idx
    }
}

/// Byte size of a class.
#[inline]
pub const fn size_of(idx: usize) -> usize {
    MIN_SIZE << idx
}

/// Class below a boundary value.
///
/// Same as [`class_of`], except that an exact class size maps to the class
/// beneath it (clamped at 0).
#[inline]
pub const fn prev_class_of(n: usize) -> usize {
    let idx = class_of(n);
    if idx > 0 && n == size_of(idx) {
        idx - 1
    } else {
        idx
    }
}

/// Largest class whose size does not exceed `n`.
///
/// A buffer with capacity `n` can satisfy any request of this class, which
/// makes it the right free list for that buffer. Anything at or above
/// [`MAX_SIZE`] belongs to the top class.
#[inline]
pub const fn fit_class_of(n: usize) -> usize {
    if n >= MAX_SIZE {
        return NUM_CLASSES - 1;
    }
    let idx = class_of(n);
    if idx == 0 || n == size_of(idx) {
        idx
    } else {
        idx - 1
    }
}

/// A size class holds idle buffers whose capacity is at least `slot_size`.
///
/// Buffers are reused LIFO so the most recently touched memory goes out first.
#[derive(Debug)]
pub struct SizeClass {
    /// Size of buffers in this class (bytes)
    pub slot_size: usize,
    /// Index of this size class
    pub index: usize,
    /// Idle buffers
    free: Mutex<Vec<Vec<u8>>>,
}

impl SizeClass {
    /// Create an empty size class
    pub fn new(index: usize) -> Self {
        Self {
            slot_size: size_of(index),
            index,
            free: Mutex::new(Vec::new()),
        }
    }

    /// Take an idle buffer, if any
    pub fn take(&self) -> Option<Vec<u8>> {
        self.free.lock().pop()
    }

    /// Park an idle buffer.
    ///
    /// Returns the buffer back when the class already holds `limit` buffers.
    pub fn give(&self, buf: Vec<u8>, limit: usize) -> Result<(), Vec<u8>> {
        let mut free = self.free.lock();
        if free.len() >= limit {
            return Err(buf);
        }
        free.push(buf);
        Ok(())
    }

    /// Drop every idle buffer, returning the number of bytes released
    pub fn drain(&self) -> usize {
        let mut free = self.free.lock();
        let bytes = free.iter().map(Vec::capacity).sum();
        free.clear();
        bytes
    }

    /// Number of idle buffers
    pub fn free_count(&self) -> usize {
        self.free.lock().len()
    }

    /// Total capacity of idle buffers
    pub fn free_bytes(&self) -> usize {
        self.free.lock().iter().map(Vec::capacity).sum()
    }

    /// Check if a given size fits in this size class
    pub fn can_fit(&self, size: usize) -> bool {
        size <= self.slot_size
    }
}
