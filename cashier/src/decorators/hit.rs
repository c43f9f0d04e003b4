//! Hit-counter: refresh after a configured number of reads instead of on a
//! wall-clock schedule, spreading recompute load across hot keys.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cashier_backend::{SetCondition, Serializer};
use cashier_core::{Cacheable, Key, Offload};

use crate::error::CacheError;
use crate::facade::Facade;

/// Reads `key`'s hit counter (`key:counter`), incrementing it with TTL
/// `ttl`. While the count is within `limit`, serves the cached value. At
/// exactly `update_after` hits, spawns a background refresh through
/// `offload` but still serves the cached value this call. Past `limit`, or
/// on a miss, recomputes synchronously and resets the counter.
pub async fn hit<T, F, Fut, O>(
    facade: &Facade,
    serializer: &Arc<Serializer>,
    offload: &O,
    key: &Key,
    ttl: Duration,
    limit: i64,
    update_after: i64,
    compute: F,
) -> Result<T, CacheError>
where
    T: Cacheable + Clone + 'static,
    F: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<T, CacheError>> + Send,
    O: Offload + 'static,
{
    let counter_key = Key::new(format!("{}:counter", key.as_str()));
    let hits = facade.incr(&counter_key, 1, Some(ttl)).await?;

    if hits <= limit {
        if let Some(raw) = facade.get(key).await? {
            if let Some(value) = super::decode::<T>(serializer, &raw) {
                if hits == update_after {
                    let facade = facade.clone();
                    let serializer = serializer.clone();
                    let key = key.clone();
                    let compute = compute.clone();
                    offload.spawn("hit-refresh", async move {
                        if let Ok(value) = compute().await {
                            if let Ok(raw) = super::encode(&serializer, &value) {
                                let _ = facade.set(&key, raw, Some(ttl), SetCondition::Always).await;
                            }
                        }
                    });
                }
                return Ok(value);
            }
        }
    }

    let value = compute().await?;
    let raw = super::encode(serializer, &value)?;
    facade.set(key, raw, Some(ttl), SetCondition::Always).await?;
    facade.set(&counter_key, cashier_core::Raw::copy_from_slice(b"1"), Some(ttl), SetCondition::Always).await?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashier_memory::MemoryBackend;

    #[derive(Clone)]
    struct TestOffload;
    impl Offload for TestOffload {
        fn spawn<F>(&self, _kind: impl Into<cashier_core::SmolStr>, future: F)
        where
            F: Future<Output = ()> + Send + 'static,
        {
            tokio::spawn(future);
        }
    }

    #[tokio::test]
    async fn serves_cached_value_within_limit() {
        let facade = Facade::builder().register("k:", MemoryBackend::builder().build()).build();
        let serializer = Arc::new(Serializer::new());
        let offload = TestOffload;
        let key = Key::new("k:1");

        let compute = || async { Ok::<u32, CacheError>(5) };
        let first = hit(&facade, &serializer, &offload, &key, Duration::from_secs(60), 10, 5, compute).await.unwrap();
        let second = hit(&facade, &serializer, &offload, &key, Duration::from_secs(60), 10, 5, compute).await.unwrap();
        assert_eq!(first, 5);
        assert_eq!(second, 5);
    }
}
