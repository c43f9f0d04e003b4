//! Early recompute: refresh a cache entry shortly before it expires instead
//! of after, so a hot key never actually goes cold.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cashier_backend::{SetCondition, Serializer};
use cashier_core::{Cacheable, Key, Offload, Raw};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::facade::Facade;

#[derive(Serialize, Deserialize)]
struct EarlyEntry<T> {
    soft_deadline: DateTime<Utc>,
    value: T,
}

/// Reads `key`. If the soft deadline has passed and this call wins the
/// short `key:hit` lock, spawns a background recompute through `offload`;
/// either way returns the cached value immediately. On a miss, computes and
/// stores synchronously.
///
/// `delta` is the target lead time before natural expiry at which the
/// recompute should fire; it's capped at `ttl - 3 * execution_time` (of the
/// call that populated the entry) so a slow upstream can't push the soft
/// deadline past the real one.
pub async fn early<T, F, Fut, O>(facade: &Facade, serializer: &Arc<Serializer>, offload: &O, key: &Key, ttl: Duration, delta: Duration, compute: F) -> Result<T, CacheError>
where
    T: Cacheable + Clone + 'static,
    F: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<T, CacheError>> + Send,
    O: Offload + 'static,
{
    if let Some(raw) = facade.get(key).await? {
        if let Some(entry) = super::decode::<EarlyEntry<T>>(serializer, &raw) {
            if Utc::now() >= entry.soft_deadline {
                let hit_key = Key::new(format!("{}:hit", key.as_str()));
                let won_lock = facade.set(&hit_key, Raw::from_static(b"1"), Some(delta.max(Duration::from_millis(1))), SetCondition::IfAbsent).await?;
                if won_lock {
                    let facade = facade.clone();
                    let serializer = serializer.clone();
                    let key = key.clone();
                    let compute = compute.clone();
                    offload.spawn("early-recompute", async move {
                        let start = Instant::now();
                        if let Ok(value) = compute().await {
                            let _ = store(&facade, &serializer, &key, ttl, delta, start.elapsed(), value).await;
                        }
                    });
                }
            }
            return Ok(entry.value);
        }
    }

    let start = Instant::now();
    let value = compute().await?;
    store(facade, serializer, key, ttl, delta, start.elapsed(), value.clone()).await?;
    Ok(value)
}

async fn store<T: Cacheable>(facade: &Facade, serializer: &Serializer, key: &Key, ttl: Duration, delta: Duration, execution_time: Duration, value: T) -> Result<(), CacheError> {
    let cap = ttl.saturating_sub(execution_time * 3);
    let effective_delta = delta.min(cap);
    let soft_deadline = Utc::now() + chrono::Duration::from_std(effective_delta).unwrap_or_default();
    let raw = super::encode(serializer, &EarlyEntry { soft_deadline, value })?;
    facade.set(key, raw, Some(ttl), SetCondition::Always).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashier_memory::MemoryBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

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
    async fn recomputes_in_background_past_soft_deadline() {
        let facade = Facade::builder().register("k:", MemoryBackend::builder().build()).build();
        let serializer = Arc::new(Serializer::new());
        let offload = TestOffload;
        let key = Key::new("k:1");
        let calls = Arc::new(AtomicUsize::new(0));

        let make_compute = {
            let calls = calls.clone();
            move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<u32, CacheError>(1)
                }
            }
        };

        let value = early(&facade, &serializer, &offload, &key, Duration::from_millis(20), Duration::from_millis(15), make_compute.clone()).await.unwrap();
        assert_eq!(value, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let value = early(&facade, &serializer, &offload, &key, Duration::from_millis(20), Duration::from_millis(15), make_compute).await.unwrap();
        assert_eq!(value, 1);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
