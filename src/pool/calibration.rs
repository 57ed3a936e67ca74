//! Percentile walk over a drained call histogram

use crate::slab::size_class::{size_of, NUM_CLASSES};
use serde::Serialize;

/// Sizes derived from one calibration pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Calibration {
    /// Size handed out by `get`
    pub serve_size: usize,
    /// Largest capacity accepted back by `put`
    pub discard_size: usize,
    /// Observations the pass was computed from
    pub total_calls: u64,
}

impl Calibration {
    /// Derive serve and discard sizes from per-class call counts.
    ///
    /// Walks the classes upward with a running sum. The serve size is the
    /// first class whose running sum reaches `serve_percentile` of the total;
    /// the discard size is the first class, at or after the serve class, whose
    /// running sum reaches `discard_percentile`.
    ///
    /// When a target is never reached the walk falls back to the highest
    /// non-empty class: the serve size becomes that class size and the discard
    /// size becomes twice that class size. The discard size is never zero.
    ///
    /// Returns `None` for an empty histogram.
    pub fn from_calls(
        calls: &[u64; NUM_CLASSES],
        serve_percentile: f64,
        discard_percentile: f64,
    ) -> Option<Self> {
        let total: u64 = calls.iter().sum();
        let highest = calls.iter().rposition(|&n| n > 0)?;

        let serve_target = percentile_target(total, serve_percentile);
        let discard_target = percentile_target(total, discard_percentile);

        let mut serve_size = None;
        let mut discard_size = None;
        let mut sum = 0u64;
        for (idx, &n) in calls.iter().enumerate() {
            sum += n;
            if serve_size.is_none() {
                if sum < serve_target {
                    continue;
                }
                serve_size = Some(size_of(idx));
            }
            if sum >= discard_target {
                discard_size = Some(size_of(idx));
                break;
            }
        }

        Some(Self {
            serve_size: serve_size.unwrap_or(size_of(highest)),
            discard_size: discard_size.unwrap_or(size_of(highest) * 2),
            total_calls: total,
        })
    }
}

/// Running-sum target for `percentile`, truncated and at least 1
fn percentile_target(total: u64, percentile: f64) -> u64 {
    ((total as f64 * percentile) as u64).max(1)
}
