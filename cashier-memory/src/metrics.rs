//! In-memory backend capacity metrics.
//!
//! Enable the `metrics` feature to use these metrics.
//!
//! - `cashier_memory_entries` - current number of entries in the cache (gauge)
//!
//! Labeled by `backend` to distinguish between multiple in-memory instances.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Metric name for cache entry count gauge.
    pub static ref MEMORY_ENTRIES: &'static str = {
        metrics::describe_gauge!(
            "cashier_memory_entries",
            "Current number of entries in the in-memory cache."
        );
        "cashier_memory_entries"
    };
}

/// Record the current entry count for `backend`.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_capacity(backend: &str, entries: u64) {
    metrics::gauge!(*MEMORY_ENTRIES, "backend" => backend.to_string()).set(entries as f64);
}

/// Record the current entry count (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_capacity(_backend: &str, _entries: u64) {}
