//! Rate limiting: fixed-window (`rate_limit`) and sliding-window
//! (`slice_rate_limit`) call throttling.

use std::time::Duration;

use cashier_backend::Backend;
use cashier_core::Key;
use chrono::Utc;

use crate::error::CacheError;
use crate::facade::Facade;

/// Fixed-window rate limit: increments `key`'s counter, setting its TTL to
/// `period` on the first hit in the window. Once the counter exceeds
/// `limit`, the key is banned for `ban_ttl` (by leaving its TTL in place at
/// the elevated count) and calls fail with [`CacheError::RateLimitReached`]
/// until it expires.
pub async fn rate_limit(facade: &Facade, key: &Key, limit: i64, period: Duration, ban_ttl: Duration) -> Result<(), CacheError> {
    let backend = facade.backend_for(key)?;
    let count = backend.incr(key, 1, None).await?;
    if count == 1 {
        backend.expire(key, period).await?;
    }
    if count > limit {
        backend.expire(key, ban_ttl).await?;
        return Err(CacheError::RateLimitReached(key.as_str().to_string()));
    }
    Ok(())
}

/// Sliding-window rate limit: counts calls in the trailing `period` seconds
/// via [`Backend::slice_incr`], capped at `limit + 1` so the overflow call
/// itself is visible without growing the window unbounded. A call past the
/// cap is rejected.
pub async fn slice_rate_limit(facade: &Facade, key: &Key, limit: u64, period: Duration) -> Result<(), CacheError> {
    let backend = facade.backend_for(key)?;
    let now = Utc::now().timestamp();
    let start = now - period.as_secs() as i64;
    let count = backend.slice_incr(key, start, now, limit + 1, period).await?;
    if count > limit {
        return Err(CacheError::RateLimitReached(key.as_str().to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashier_memory::MemoryBackend;

    #[tokio::test]
    async fn fixed_window_bans_past_limit() {
        let facade = Facade::builder().register("k:", MemoryBackend::builder().build()).build();
        let key = Key::new("k:caller");

        for _ in 0..3 {
            rate_limit(&facade, &key, 3, Duration::from_secs(60), Duration::from_secs(5)).await.unwrap();
        }
        let err = rate_limit(&facade, &key, 3, Duration::from_secs(60), Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, CacheError::RateLimitReached(_)));
    }

    #[tokio::test]
    async fn sliding_window_rejects_past_limit() {
        let facade = Facade::builder().register("k:", MemoryBackend::builder().build()).build();
        let key = Key::new("k:caller");

        for _ in 0..3 {
            slice_rate_limit(&facade, &key, 3, Duration::from_secs(60)).await.unwrap();
        }
        let err = slice_rate_limit(&facade, &key, 3, Duration::from_secs(60)).await.unwrap_err();
        assert!(matches!(err, CacheError::RateLimitReached(_)));
    }
}
