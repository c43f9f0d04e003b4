//! Facade and decorator metrics.
//!
//! Enable the `metrics` feature to use these. All metrics follow the
//! pattern `cashier_{metric}`, labeled by `key_type` (for offload tasks) or
//! by the decorator strategy name and cache key (for decorator metrics).

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Total offload tasks spawned, labeled by `key_type`.
    pub static ref OFFLOAD_TASKS_SPAWNED: &'static str = {
        metrics::describe_counter!(
            "cashier_offload_tasks_spawned_total",
            "Total background tasks spawned through the Offload trait, labeled by key_type."
        );
        "cashier_offload_tasks_spawned_total"
    };

    /// Total offload tasks that ran to completion, labeled by `key_type`.
    pub static ref OFFLOAD_TASKS_COMPLETED: &'static str = {
        metrics::describe_counter!(
            "cashier_offload_tasks_completed_total",
            "Total background tasks that completed, labeled by key_type."
        );
        "cashier_offload_tasks_completed_total"
    };

    /// Total offload tasks cancelled by their timeout policy, labeled by `key_type`.
    pub static ref OFFLOAD_TASKS_TIMEOUT: &'static str = {
        metrics::describe_counter!(
            "cashier_offload_tasks_timeout_total",
            "Total background tasks cancelled by a timeout policy, labeled by key_type."
        );
        "cashier_offload_tasks_timeout_total"
    };

    /// Total offload tasks skipped due to in-flight deduplication, labeled by `key_type`.
    pub static ref OFFLOAD_TASKS_DEDUPLICATED: &'static str = {
        metrics::describe_counter!(
            "cashier_offload_tasks_deduplicated_total",
            "Total background tasks skipped because one with the same key was already in flight."
        );
        "cashier_offload_tasks_deduplicated_total"
    };

    /// Currently active offload tasks, labeled by `key_type`.
    pub static ref OFFLOAD_TASKS_ACTIVE: &'static str = {
        metrics::describe_gauge!(
            "cashier_offload_tasks_active",
            "Currently running background tasks, labeled by key_type."
        );
        "cashier_offload_tasks_active"
    };

    /// Offload task duration in seconds, labeled by `key_type`.
    pub static ref OFFLOAD_TASK_DURATION: &'static str = {
        metrics::describe_histogram!(
            "cashier_offload_task_duration_seconds",
            metrics::Unit::Seconds,
            "Background task duration in seconds, labeled by key_type."
        );
        "cashier_offload_task_duration_seconds"
    };

    /// Decorator-level cache hits, labeled by `strategy`.
    pub static ref DECORATOR_HITS: &'static str = {
        metrics::describe_counter!(
            "cashier_decorator_hits_total",
            "Cache hits observed by a decorator, labeled by strategy."
        );
        "cashier_decorator_hits_total"
    };

    /// Decorator-level cache misses, labeled by `strategy`.
    pub static ref DECORATOR_MISSES: &'static str = {
        metrics::describe_counter!(
            "cashier_decorator_misses_total",
            "Cache misses observed by a decorator, labeled by strategy."
        );
        "cashier_decorator_misses_total"
    };

    /// Stale values served by a decorator, labeled by `strategy`.
    pub static ref DECORATOR_STALE_SERVED: &'static str = {
        metrics::describe_counter!(
            "cashier_decorator_stale_served_total",
            "Stale cached values served while a background recompute is in flight."
        );
        "cashier_decorator_stale_served_total"
    };

    /// Circuit breaker state transitions, labeled by `key`.
    pub static ref CIRCUIT_BREAKER_OPENED: &'static str = {
        metrics::describe_counter!(
            "cashier_circuit_breaker_opened_total",
            "Times a circuit breaker tripped open, labeled by key."
        );
        "cashier_circuit_breaker_opened_total"
    };

    /// Rate limit rejections, labeled by `key`.
    pub static ref RATE_LIMIT_REJECTED: &'static str = {
        metrics::describe_counter!(
            "cashier_rate_limit_rejected_total",
            "Calls rejected by a rate limit decorator, labeled by key."
        );
        "cashier_rate_limit_rejected_total"
    };
}
