//! Failover: serve the last good cached value when the upstream call fails,
//! rather than a soft deadline driving staleness.

use std::future::Future;

use cashier_backend::{SetCondition, Serializer};
use cashier_core::{Cacheable, Key};

use crate::error::CacheError;
use crate::facade::Facade;

/// Calls `compute`. On success, conditionally caches (`condition`) and
/// returns the result. On failure, returns the last cached value if one
/// exists; otherwise propagates the error.
pub async fn failover<T, F, Fut>(facade: &Facade, serializer: &Serializer, key: &Key, ttl: Option<std::time::Duration>, condition: impl Fn(&T) -> bool, compute: F) -> Result<T, CacheError>
where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, CacheError>>,
{
    match compute().await {
        Ok(value) => {
            if condition(&value) {
                let raw = super::encode(serializer, &value)?;
                facade.set(key, raw, ttl, SetCondition::Always).await?;
            }
            Ok(value)
        }
        Err(err) => match facade.get(key).await? {
            Some(raw) => super::decode::<T>(serializer, &raw).ok_or(err),
            None => Err(err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashier_memory::MemoryBackend;

    #[tokio::test]
    async fn serves_last_good_value_on_failure() {
        let facade = Facade::builder().register("k:", MemoryBackend::builder().build()).build();
        let serializer = Serializer::new();
        let key = Key::new("k:1");

        failover(&facade, &serializer, &key, None, |_: &u32| true, || async { Ok::<u32, CacheError>(3) }).await.unwrap();

        let value = failover(&facade, &serializer, &key, None, |_: &u32| true, || async { Err::<u32, CacheError>(CacheError::NotConfigured) })
            .await
            .unwrap();
        assert_eq!(value, 3);
    }
}
