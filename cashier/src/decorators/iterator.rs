//! Lazy-sequence caching: cache a stream chunk by chunk instead of
//! buffering the whole thing before a single store.

use std::time::{Duration, Instant};

use cashier_backend::{SetCondition, Serializer};
use cashier_core::{Cacheable, Key};
use futures::{Stream, StreamExt, pin_mut};

use crate::error::CacheError;
use crate::facade::Facade;

fn chunk_key(key: &Key, index: u64) -> Key {
    Key::new(format!("{}:{index}", key.as_str()))
}

/// Replays a previously cached sequence at `key`, or drains `producer` and
/// caches it chunk by chunk as it consumes it.
///
/// On replay, chunks `key:0`, `key:1`, ... are read until one is missing; if
/// the marker at `key` claims more chunks than are actually present, the
/// replay is abandoned and `producer` is run instead. While draining
/// `producer`, `condition` may turn off caching partway through (a
/// mid-stream decision not to keep the rest) without aborting the stream
/// itself; the already-stored prefix is left in place. The completion
/// marker's TTL is `ttl` minus the time the producer took to run, so the
/// cached sequence doesn't outlive what a fresh run starting now would.
pub async fn iterator<T, S>(facade: &Facade, serializer: &Serializer, key: &Key, ttl: Duration, condition: impl Fn(&T) -> bool, producer: S) -> Result<Vec<T>, CacheError>
where
    T: Cacheable,
    S: Stream<Item = Result<T, CacheError>>,
{
    if let Some(marker) = facade.get(key).await? {
        if let Some(count) = super::decode::<u64>(serializer, &marker) {
            if let Some(items) = replay(facade, serializer, key, count).await? {
                return Ok(items);
            }
        }
    }

    let start = Instant::now();
    pin_mut!(producer);
    let mut items = Vec::new();
    let mut caching = true;
    let mut index = 0u64;

    while let Some(next) = producer.next().await {
        let value = next?;
        if caching {
            if condition(&value) {
                let raw = super::encode(serializer, &value)?;
                facade.set(&chunk_key(key, index), raw, Some(ttl), SetCondition::Always).await?;
            } else {
                caching = false;
            }
        }
        items.push(value);
        index += 1;
    }

    if caching {
        let marker_ttl = ttl.saturating_sub(start.elapsed());
        let marker = super::encode(serializer, &index)?;
        facade.set(key, marker, Some(marker_ttl), SetCondition::Always).await?;
    }
    Ok(items)
}

async fn replay<T: Cacheable>(facade: &Facade, serializer: &Serializer, key: &Key, count: u64) -> Result<Option<Vec<T>>, CacheError> {
    let mut items = Vec::with_capacity(count as usize);
    for index in 0..count {
        match facade.get(&chunk_key(key, index)).await? {
            Some(raw) => match super::decode::<T>(serializer, &raw) {
                Some(value) => items.push(value),
                None => return Ok(None),
            },
            None => return Ok(None),
        }
    }
    Ok(Some(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashier_memory::MemoryBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn replays_cached_sequence_without_rerunning_producer() {
        let facade = Facade::builder().register("k:", MemoryBackend::builder().build()).build();
        let serializer = Serializer::new();
        let key = Key::new("k:seq");
        let runs = Arc::new(AtomicUsize::new(0));

        let make_stream = {
            let runs = runs.clone();
            move || {
                runs.fetch_add(1, Ordering::SeqCst);
                futures::stream::iter(vec![Ok::<u32, CacheError>(1), Ok(2), Ok(3)])
            }
        };

        let first = iterator(&facade, &serializer, &key, Duration::from_secs(60), |_: &u32| true, make_stream()).await.unwrap();
        assert_eq!(first, vec![1, 2, 3]);

        let second = iterator(&facade, &serializer, &key, Duration::from_secs(60), |_: &u32| true, make_stream()).await.unwrap();
        assert_eq!(second, vec![1, 2, 3]);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
