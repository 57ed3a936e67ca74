//! Slab store
//!
//! Idle buffers are kept in power-of-two size classes:
//!
//! ```text
//! SlabStore
//!   ├─→ SizeClass(64B)    → Free: [buf, buf]
//!   ├─→ SizeClass(128B)   → Free: [buf]
//!   ├─→ SizeClass(256B)   → Free: []
//!   ...
//!   └─→ SizeClass(32MiB)  → Free: []
//! ```
//!
//! A request for `n` bytes is served from `class_of(n)` (or the class above
//! it); a returned buffer goes to `fit_class_of(capacity)`.

pub mod size_class;
pub mod store;

pub use size_class::{
    class_of, fit_class_of, prev_class_of, size_of, SizeClass, MAX_POOL_SIZE, MAX_SIZE, MIN_SIZE,
    NUM_CLASSES,
};
pub use store::{SizeClassStats, SlabStore, StoreStats};
