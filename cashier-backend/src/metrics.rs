//! Backend metrics for the cashier caching framework.
//!
//! This module provides metrics for cache backend operations.
//! Enable the `metrics` feature to use these metrics.
//!
//! ## Naming Pattern
//!
//! All metrics follow the pattern: `cashier_backend_{metric}`, labeled by
//! `backend` (the backend's [`BackendLabel`](cashier_core::BackendLabel))
//! and `command` (the [`Command`](cashier_core::Command) that ran), so a
//! single counter/histogram pair covers every operation in the contract
//! instead of one pair per operation.

use std::time::Duration;

#[cfg(feature = "metrics")]
use std::time::Instant;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

/// Zero-cost timer for metrics collection.
///
/// When the `metrics` feature is enabled, this captures the start time.
/// When disabled, this is a zero-sized struct with no overhead.
pub struct Timer {
    #[cfg(feature = "metrics")]
    start: Instant,
}

impl Timer {
    /// Create a new timer, capturing the current instant if metrics enabled.
    #[inline]
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "metrics")]
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer creation.
    ///
    /// Returns actual elapsed time when metrics enabled, Duration::ZERO otherwise.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        #[cfg(feature = "metrics")]
        {
            self.start.elapsed()
        }
        #[cfg(not(feature = "metrics"))]
        {
            Duration::ZERO
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "metrics")]
lazy_static! {
    /// Metric name for total operations counter.
    pub static ref BACKEND_OP_TOTAL: &'static str = {
        metrics::describe_counter!(
            "cashier_backend_operations_total",
            "Total number of backend operations, labeled by backend and command."
        );
        "cashier_backend_operations_total"
    };

    /// Metric name for operation duration histogram.
    pub static ref BACKEND_OP_DURATION: &'static str = {
        metrics::describe_histogram!(
            "cashier_backend_operation_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of backend operations in seconds, labeled by backend and command."
        );
        "cashier_backend_operation_duration_seconds"
    };

    /// Metric name for operation errors counter.
    pub static ref BACKEND_OP_ERRORS: &'static str = {
        metrics::describe_counter!(
            "cashier_backend_operation_errors_total",
            "Total number of backend operation errors, labeled by backend and command."
        );
        "cashier_backend_operation_errors_total"
    };

    /// Metric name for bytes read counter.
    pub static ref BACKEND_READ_BYTES: &'static str = {
        metrics::describe_counter!(
            "cashier_backend_read_bytes_total",
            "Total bytes read from cache, labeled by backend."
        );
        "cashier_backend_read_bytes_total"
    };

    /// Metric name for bytes written counter.
    pub static ref BACKEND_WRITE_BYTES: &'static str = {
        metrics::describe_counter!(
            "cashier_backend_write_bytes_total",
            "Total bytes written to cache, labeled by backend."
        );
        "cashier_backend_write_bytes_total"
    };
}

/// Record an operation's outcome and duration.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_operation(backend: &str, command: &str, duration: Duration) {
    metrics::counter!(*BACKEND_OP_TOTAL, "backend" => backend.to_string(), "command" => command.to_string())
        .increment(1);
    metrics::histogram!(*BACKEND_OP_DURATION, "backend" => backend.to_string(), "command" => command.to_string())
        .record(duration.as_secs_f64());
}

/// Record an operation's outcome and duration (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_operation(_backend: &str, _command: &str, _duration: Duration) {}

/// Record an operation that failed.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_operation_error(backend: &str, command: &str) {
    metrics::counter!(*BACKEND_OP_ERRORS, "backend" => backend.to_string(), "command" => command.to_string())
        .increment(1);
}

/// Record an operation that failed (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_operation_error(_backend: &str, _command: &str) {}

/// Record bytes read from cache.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_read_bytes(backend: &str, bytes: usize) {
    metrics::counter!(*BACKEND_READ_BYTES, "backend" => backend.to_string()).increment(bytes as u64);
}

/// Record bytes read (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_read_bytes(_backend: &str, _bytes: usize) {}

/// Record bytes written to cache.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_write_bytes(backend: &str, bytes: usize) {
    metrics::counter!(*BACKEND_WRITE_BYTES, "backend" => backend.to_string()).increment(bytes as u64);
}

/// Record bytes written (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_write_bytes(_backend: &str, _bytes: usize) {}
