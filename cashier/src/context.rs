//! Task-local cache-control context.
//!
//! Two flags propagate through the task tree independently of any explicit
//! argument: "invalidate further" (the next retrieve on a key should instead
//! delete it and return a default) and a cache-control max-age override.
//! Disable-control ([`cashier_core::disable`]) and cache-detect
//! ([`cashier_core::detect`]) cover the other two task-locals this
//! specification calls for; this module only adds what those two don't.

use std::cell::Cell;
use std::future::Future;
use std::time::Duration;

tokio::task_local! {
    static INVALIDATE_FURTHER: Cell<bool>;
    static MAX_AGE: Cell<Option<Duration>>;
}

/// Runs `fut` with "invalidate further" armed: the [`crate::middleware::invalidate_further`]
/// middleware will turn the next retrieve on any key touched inside `fut`
/// into a delete, returning the default value instead of serving from cache.
pub async fn invalidate_further<F, T>(fut: F) -> T
where
    F: Future<Output = T>,
{
    INVALIDATE_FURTHER.scope(Cell::new(true), fut).await
}

/// True if the current task is inside an [`invalidate_further`] scope.
pub fn is_invalidating_further() -> bool {
    INVALIDATE_FURTHER.try_with(|flag| flag.get()).unwrap_or(false)
}

/// Runs `fut` with a cache-control max-age override in scope, consulted by
/// decorators computing their effective TTL (e.g. an HTTP `Cache-Control`
/// header clamping a decorator's configured TTL downward).
pub async fn with_max_age<F, T>(max_age: Duration, fut: F) -> T
where
    F: Future<Output = T>,
{
    MAX_AGE.scope(Cell::new(Some(max_age)), fut).await
}

/// The current cache-control max-age override, if any scope set one.
pub fn max_age() -> Option<Duration> {
    MAX_AGE.try_with(|age| age.get()).unwrap_or(None)
}

/// Clamps `ttl` to the current [`max_age`] override, if one is in scope and
/// smaller than `ttl`.
pub fn clamp_ttl(ttl: Duration) -> Duration {
    match max_age() {
        Some(max) if max < ttl => max,
        _ => ttl,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalidate_further_flag_is_scoped() {
        assert!(!is_invalidating_further());
        invalidate_further(async {
            assert!(is_invalidating_further());
        })
        .await;
        assert!(!is_invalidating_further());
    }

    #[tokio::test]
    async fn max_age_clamps_larger_ttl() {
        with_max_age(Duration::from_secs(5), async {
            assert_eq!(clamp_ttl(Duration::from_secs(60)), Duration::from_secs(5));
            assert_eq!(clamp_ttl(Duration::from_secs(1)), Duration::from_secs(1));
        })
        .await;
    }
}
