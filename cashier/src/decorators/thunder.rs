//! Thundering-herd protection: coalesce concurrent in-process calls for the
//! same key behind a single in-flight future. Local only — this does not
//! coordinate across processes, unlike [`crate::decorators::locked`].

use std::future::Future;
use std::sync::Arc;

use cashier_core::Key;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::error::CacheError;

/// Tracks in-flight computations by key so concurrent callers share one
/// upstream call instead of each starting their own.
#[derive(Default)]
pub struct ThunderGuard<T> {
    in_flight: DashMap<Key, broadcast::Sender<Result<T, String>>>,
}

impl<T: Clone + Send + Sync + 'static> ThunderGuard<T> {
    /// Creates an empty guard.
    pub fn new() -> Self {
        Self { in_flight: DashMap::new() }
    }

    /// Runs `compute` for `key`, or, if another call for the same key is
    /// already in flight, awaits its result instead of starting a second one.
    pub async fn call<F, Fut>(self: &Arc<Self>, key: &Key, compute: F) -> Result<T, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        let mut receiver = match self.in_flight.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Some(entry.get().subscribe()),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let (tx, _rx) = broadcast::channel(1);
                entry.insert(tx);
                None
            }
        };

        if let Some(receiver) = receiver.as_mut() {
            return match receiver.recv().await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(message)) => Err(CacheError::upstream(std::io::Error::other(message))),
                Err(_) => Err(CacheError::upstream(std::io::Error::other("thunder: sender dropped"))),
            };
        }

        let result = compute().await;
        if let Some((_, tx)) = self.in_flight.remove(key) {
            let _ = tx.send(result.as_ref().map(Clone::clone).map_err(|e| e.to_string()));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn coalesces_concurrent_calls_for_same_key() {
        let guard = Arc::new(ThunderGuard::<u32>::new());
        let key = Key::new("k:1");
        let calls = Arc::new(AtomicUsize::new(0));

        let run = |guard: Arc<ThunderGuard<u32>>, key: Key, calls: Arc<AtomicUsize>| async move {
            guard
                .call(&key, || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    Ok::<u32, CacheError>(42)
                })
                .await
        };

        let (a, b) = tokio::join!(run(guard.clone(), key.clone(), calls.clone()), run(guard.clone(), key.clone(), calls.clone()));

        assert_eq!(a.unwrap(), 42);
        assert_eq!(b.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
