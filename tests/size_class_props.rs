//! Property tests for the size-class arithmetic

use bufpool::slab::{
    class_of, fit_class_of, prev_class_of, size_of, MAX_SIZE, MIN_SIZE, NUM_CLASSES,
};
use proptest::prelude::*;

proptest! {
    #[test]
    fn class_covers_request(n in 0usize..=MAX_SIZE) {
        let idx = class_of(n);
        prop_assert!(idx < NUM_CLASSES);
        prop_assert!(size_of(idx) >= n);
        if idx > 0 {
            prop_assert!(size_of(idx - 1) < n);
        }
    }

    #[test]
    fn class_is_monotonic(a in 0usize..=MAX_SIZE * 2, b in 0usize..=MAX_SIZE * 2) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(class_of(lo) <= class_of(hi));
    }

    #[test]
    fn fit_class_fits_inside(n in MIN_SIZE..=MAX_SIZE * 2) {
        let idx = fit_class_of(n);
        prop_assert!(size_of(idx) <= n);
        prop_assert!(idx <= class_of(n));
        if idx + 1 < NUM_CLASSES {
            prop_assert!(size_of(idx + 1) > n);
        }
    }

    #[test]
    fn prev_class_below_boundaries(n in 0usize..=MAX_SIZE * 2) {
        let idx = class_of(n);
        let prev = prev_class_of(n);
        if idx > 0 && n == size_of(idx) {
            prop_assert_eq!(prev, idx - 1);
        } else {
            prop_assert_eq!(prev, idx);
        }
    }

    #[test]
    fn class_size_roundtrip(idx in 0usize..NUM_CLASSES) {
        prop_assert_eq!(class_of(size_of(idx)), idx);
        prop_assert_eq!(fit_class_of(size_of(idx)), idx);
        prop_assert_eq!(prev_class_of(size_of(idx)), idx.saturating_sub(1));
    }
}

#[test]
fn test_above_max_size_is_top_class() {
    assert_eq!(class_of(MAX_SIZE + 1), NUM_CLASSES - 1);
    assert_eq!(class_of(usize::MAX), NUM_CLASSES - 1);
}
