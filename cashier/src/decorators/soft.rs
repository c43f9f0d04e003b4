//! Soft TTL: serve a value past its soft deadline while recomputing fails,
//! instead of propagating the upstream error.

use std::future::Future;

use cashier_backend::{SetCondition, Serializer};
use cashier_core::{Cacheable, Key};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::facade::Facade;

#[derive(Serialize, Deserialize)]
struct SoftEntry<T> {
    soft_deadline: DateTime<Utc>,
    value: T,
}

/// Serves the cached value while `now < soft_deadline`. Past the deadline
/// (or on a miss), calls `compute`; if it fails and a stale cached value
/// exists, that stale value is returned instead of the error. On success,
/// stores with TTL `ttl` and a fresh soft deadline `soft_ttl` out (default
/// `ttl / 3` — pass `None` for that default).
pub async fn soft<T, F, Fut>(facade: &Facade, serializer: &Serializer, key: &Key, ttl: std::time::Duration, soft_ttl: Option<std::time::Duration>, compute: F) -> Result<T, CacheError>
where
    T: Cacheable + Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, CacheError>>,
{
    let cached = facade
        .get(key)
        .await?
        .and_then(|raw| super::decode::<SoftEntry<T>>(serializer, &raw));

    if let Some(entry) = &cached {
        if Utc::now() < entry.soft_deadline {
            return Ok(entry.value.clone());
        }
    }

    match compute().await {
        Ok(value) => {
            let soft_ttl = soft_ttl.unwrap_or(ttl / 3);
            let soft_deadline = Utc::now() + chrono::Duration::from_std(soft_ttl).unwrap_or_default();
            let raw = super::encode(serializer, &SoftEntry { soft_deadline, value: value.clone() })?;
            facade.set(key, raw, Some(ttl), SetCondition::Always).await?;
            Ok(value)
        }
        Err(err) => match cached {
            Some(entry) => Ok(entry.value),
            None => Err(err),
        },
    }
}
