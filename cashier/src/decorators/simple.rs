//! Get-or-compute: the base decorator every other strategy builds on.

use std::future::Future;

use cashier_backend::{SetCondition, Serializer};
use cashier_core::detect::{self, DetectEntry};
use cashier_core::{Cacheable, CacheStatus, Command, Key, Ttl};

use crate::error::CacheError;
use crate::facade::Facade;
use crate::tags::TagRegistry;

/// Returns the cached value at `key`, or calls `compute`, stores the result
/// under `ttl` if `condition(&result)` holds, and returns it.
///
/// `tags` names the tag templates (see [`TagRegistry::register`]) a freshly
/// computed value should be tagged with via `registry`; pass an empty slice
/// to skip tagging. Every hit and miss records a [`DetectEntry`] in the
/// active [`cashier_core::detect`] scope, if one is active.
pub async fn simple<T, F, Fut>(
    facade: &Facade,
    serializer: &Serializer,
    key: &Key,
    ttl: Ttl,
    registry: &TagRegistry,
    tags: &[&str],
    condition: impl Fn(&T) -> bool,
    compute: F,
) -> Result<T, CacheError>
where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, CacheError>>,
{
    if let Some(raw) = facade.get(key).await? {
        if let Some(value) = super::decode::<T>(serializer, &raw) {
            detect::record(DetectEntry::new(key.clone(), Command::Get, CacheStatus::Hit));
            return Ok(value);
        }
    }
    detect::record(DetectEntry::new(key.clone(), Command::Get, CacheStatus::Miss));

    let value = compute().await?;
    if condition(&value) {
        let raw = super::encode(serializer, &value)?;
        facade.set(key, raw, ttl.as_duration(), SetCondition::Always).await?;
        if !tags.is_empty() {
            let backend = facade.backend_for(key)?;
            registry.tag(&backend, key, tags).await?;
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashier_memory::MemoryBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn caches_after_first_compute() {
        let facade = Facade::builder().register("k:", MemoryBackend::builder().build()).build();
        let serializer = Serializer::new();
        let registry = TagRegistry::new();
        let key = Key::new("k:1");
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value = simple(&facade, &serializer, &key, Ttl::Unbounded, &registry, &[], |_: &u32| true, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7u32)
            })
            .await
            .unwrap();
            assert_eq!(value, 7);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tags_a_freshly_computed_value_and_makes_it_invalidatable() {
        let facade = Facade::builder().register("k:", MemoryBackend::builder().build()).build();
        let serializer = Serializer::new();
        let registry = TagRegistry::new();
        registry.register("user:{uid}", "k:{uid}").unwrap();
        let key = Key::new("k:1");

        simple(&facade, &serializer, &key, Ttl::Unbounded, &registry, &["user:{uid}"], |_: &u32| true, || async { Ok(7u32) })
            .await
            .unwrap();

        assert!(facade.get(&key).await.unwrap().is_some());
        let backend = facade.backend_for(&key).unwrap();
        let deleted = registry.delete_tags(&backend, &["user:1"]).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(facade.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn records_hit_and_miss_in_the_active_detect_scope() {
        let facade = Facade::builder().register("k:", MemoryBackend::builder().build()).build();
        let serializer = Serializer::new();
        let registry = TagRegistry::new();
        let key = Key::new("k:1");

        let (_, entries) = detect::detect(async {
            simple(&facade, &serializer, &key, Ttl::Unbounded, &registry, &[], |_: &u32| true, || async { Ok(7u32) })
                .await
                .unwrap();
            simple(&facade, &serializer, &key, Ttl::Unbounded, &registry, &[], |_: &u32| true, || async { Ok(7u32) })
                .await
                .unwrap();
        })
        .await;

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, CacheStatus::Miss);
        assert_eq!(entries[1].status, CacheStatus::Hit);
    }
}
