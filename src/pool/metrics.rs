//! Metrics emitted by adaptive pools
//!
//! Uses the `metrics` facade; nothing is recorded unless the host
//! application installs a recorder.
//!
//! - `bufpool_calibrations_total{pool}`
//! - `bufpool_discarded_total{pool}`
//! - `bufpool_serve_size_bytes{pool}`
//! - `bufpool_discard_size_bytes{pool}`

use super::calibration::Calibration;
use ::metrics::{counter, describe_counter, describe_gauge, gauge, Unit};

pub const CALIBRATIONS_TOTAL: &str = "bufpool_calibrations_total";
pub const DISCARDED_TOTAL: &str = "bufpool_discarded_total";
pub const SERVE_SIZE_BYTES: &str = "bufpool_serve_size_bytes";
pub const DISCARD_SIZE_BYTES: &str = "bufpool_discard_size_bytes";

/// Register metric descriptions with the installed recorder
pub fn describe_metrics() {
    describe_counter!(CALIBRATIONS_TOTAL, "Completed calibration passes");
    describe_counter!(DISCARDED_TOTAL, "Buffers dropped for exceeding the discard size");
    describe_gauge!(SERVE_SIZE_BYTES, Unit::Bytes, "Buffer size handed out by get");
    describe_gauge!(DISCARD_SIZE_BYTES, Unit::Bytes, "Largest capacity recycled by put");
}

pub(crate) fn record_calibration(pool: &str, calibration: &Calibration) {
    counter!(CALIBRATIONS_TOTAL, "pool" => pool.to_string()).increment(1);
    gauge!(SERVE_SIZE_BYTES, "pool" => pool.to_string()).set(calibration.serve_size as f64);
    gauge!(DISCARD_SIZE_BYTES, "pool" => pool.to_string()).set(calibration.discard_size as f64);
}

pub(crate) fn record_discard(pool: &str) {
    counter!(DISCARDED_TOTAL, "pool" => pool.to_string()).increment(1);
}
