//! Circuit breaker: trip on a sliding-window error rate, fail fast while
//! open, then probe with half the traffic once the window has aged out.

use std::future::Future;
use std::time::Duration;

use cashier_backend::{Backend, Expiry, SetCondition};
use cashier_core::{Key, Raw};
use chrono::Utc;

use crate::error::CacheError;
use crate::facade::Facade;

/// Runs `compute` behind a breaker keyed off `key`. Tracks calls and
/// failures over a `period`-second sliding window; once at least
/// `min_calls` have been seen and the failure rate is at or above
/// `error_rate` (0.0–1.0), opens the breaker for `open_ttl`. While open,
/// calls fail immediately with [`CacheError::CircuitBreakerOpen`]. In the
/// trailing `half_open_ttl` of that window, roughly half of calls are let
/// through to probe recovery; the rest still fail fast.
pub async fn circuit_breaker<T, F, Fut>(facade: &Facade, key: &Key, period: Duration, min_calls: u64, error_rate: f64, open_ttl: Duration, half_open_ttl: Duration, compute: F) -> Result<T, CacheError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, CacheError>>,
{
    let backend = facade.backend_for(key)?;
    let open_key = Key::new(format!("{}:open", key.as_str()));
    let total_key = Key::new(format!("{}:total", key.as_str()));
    let fails_key = Key::new(format!("{}:fails", key.as_str()));

    if let Expiry::In(remaining) = backend.get_expire(&open_key).await? {
        if remaining > half_open_ttl {
            return Err(CacheError::CircuitBreakerOpen(key.as_str().to_string()));
        }
        if rand::random::<bool>() {
            return Err(CacheError::CircuitBreakerOpen(key.as_str().to_string()));
        }
    }

    let now = Utc::now().timestamp();
    let start = now - period.as_secs() as i64;
    let total = backend.slice_incr(&total_key, start, now, u64::MAX, period).await?;

    match compute().await {
        Ok(value) => Ok(value),
        Err(err) => {
            let fails = backend.slice_incr(&fails_key, start, now, u64::MAX, period).await?;
            if total >= min_calls && (fails as f64 / total as f64) >= error_rate {
                backend.set(&open_key, Raw::copy_from_slice(b"1"), Some(open_ttl + half_open_ttl), SetCondition::Always).await?;
            }
            Err(err)
        }
    }
}
