//! Mutual-exclusion recompute: only one caller runs the upstream function at
//! a time; others wait for the lock, then read what the winner stored.

use std::future::Future;
use std::time::Duration;

use cashier_backend::{Backend, SetCondition};
use cashier_core::{Cacheable, Key, Raw};
use uuid::Uuid;

use crate::error::CacheError;
use crate::facade::Facade;

/// Acquires `lock(key, lock_ttl)`. The winner calls `compute` and stores the
/// result. A loser polls `is_locked` (stepping by `min_wait_time`) until the
/// lock is released, then reads whatever the winner stored.
pub async fn locked<T, F, Fut>(facade: &Facade, serializer: &cashier_backend::Serializer, key: &Key, lock_ttl: Duration, min_wait_time: Duration, compute: F) -> Result<T, CacheError>
where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, CacheError>>,
{
    let backend = facade.backend_for(key)?;
    let lock_key = Key::new(format!("{}:lock", key.as_str()));
    let owner = Raw::copy_from_slice(Uuid::new_v4().as_bytes());

    match cashier_backend::lock(backend.clone(), lock_key.clone(), owner, lock_ttl).await? {
        Some(guard) => {
            let value = compute().await?;
            let raw = super::encode(serializer, &value)?;
            facade.set(key, raw, Some(lock_ttl), SetCondition::Always).await?;
            guard.release().await?;
            Ok(value)
        }
        None => {
            backend.is_locked(&lock_key, Some(lock_ttl), min_wait_time).await?;
            match facade.get(key).await? {
                Some(raw) => super::decode::<T>(serializer, &raw).ok_or(CacheError::Locked(key.as_str().to_string())),
                None => Err(CacheError::Locked(key.as_str().to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashier_memory::MemoryBackend;

    #[tokio::test]
    async fn winner_computes_and_stores() {
        let facade = Facade::builder().register("k:", MemoryBackend::builder().build()).build();
        let serializer = cashier_backend::Serializer::new();
        let key = Key::new("k:1");

        let value = locked(&facade, &serializer, &key, Duration::from_secs(5), Duration::from_millis(5), || async { Ok::<u32, CacheError>(11) })
            .await
            .unwrap();
        assert_eq!(value, 11);
        assert_eq!(facade.get(&key).await.unwrap().and_then(|raw| super::super::decode::<u32>(&serializer, &raw)), Some(11));
    }
}
