//! A minimal in-memory remote backend that can publish invalidations,
//! for exercising [`cashier_clientside::ClientSideBackend`] without a real
//! wire client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cashier_backend::{Backend, BackendResult, DeleteStatus, Expiry, RemoveCallback, SetCondition};
use cashier_clientside::{BroadcastSource, Invalidate};
use cashier_core::{Key, Raw};
use cashier_memory::MemoryBackend;
use tokio::sync::broadcast;

/// A [`MemoryBackend`] paired with a broadcast channel, standing in for a
/// remote cache that pushes invalidation notices to its clients.
#[derive(Clone)]
pub struct TestRemote {
    inner: MemoryBackend,
    invalidations: Arc<broadcast::Sender<Invalidate>>,
}

impl TestRemote {
    /// Creates an empty remote with room for 16 buffered invalidations per subscriber.
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(16);
        Self { inner: MemoryBackend::builder().build(), invalidations: Arc::new(tx) }
    }

    /// Publishes an invalidation to every current subscriber.
    pub fn publish(&self, message: Invalidate) {
        let _ = self.invalidations.send(message);
    }
}

impl Default for TestRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for TestRemote {
    async fn set(&self, key: &Key, value: Raw, expire: Option<Duration>, condition: SetCondition) -> BackendResult<bool> {
        self.inner.set(key, value, expire, condition).await
    }
    async fn get(&self, key: &Key) -> BackendResult<Option<Raw>> {
        self.inner.get(key).await
    }
    async fn get_match(&self, pattern: &str) -> BackendResult<Vec<(Key, Raw)>> {
        self.inner.get_match(pattern).await
    }
    async fn scan(&self, pattern: &str) -> BackendResult<Vec<Key>> {
        self.inner.scan(pattern).await
    }
    async fn incr(&self, key: &Key, amount: i64, expire: Option<Duration>) -> BackendResult<i64> {
        self.inner.incr(key, amount, expire).await
    }
    async fn delete(&self, key: &Key) -> BackendResult<DeleteStatus> {
        self.inner.delete(key).await
    }
    async fn expire(&self, key: &Key, ttl: Duration) -> BackendResult<bool> {
        self.inner.expire(key, ttl).await
    }
    async fn get_expire(&self, key: &Key) -> BackendResult<Expiry> {
        self.inner.get_expire(key).await
    }
    async fn get_bits(&self, key: &Key, idxs: &[u32], size: u8) -> BackendResult<Vec<u64>> {
        self.inner.get_bits(key, idxs, size).await
    }
    async fn incr_bits(&self, key: &Key, idxs: &[u32], size: u8, increments: &[i64]) -> BackendResult<Vec<u64>> {
        self.inner.incr_bits(key, idxs, size, increments).await
    }
    async fn slice_incr(&self, key: &Key, start: i64, end: i64, max_value: u64, expire: Duration) -> BackendResult<u64> {
        self.inner.slice_incr(key, start, end, max_value, expire).await
    }
    async fn set_add(&self, key: &Key, members: &[Raw]) -> BackendResult<()> {
        self.inner.set_add(key, members).await
    }
    async fn set_remove(&self, key: &Key, members: &[Raw]) -> BackendResult<()> {
        self.inner.set_remove(key, members).await
    }
    async fn set_pop(&self, key: &Key, count: usize) -> BackendResult<Vec<Raw>> {
        self.inner.set_pop(key, count).await
    }
    async fn set_lock(&self, key: &Key, owner: &Raw, expire: Duration) -> BackendResult<bool> {
        self.inner.set_lock(key, owner, expire).await
    }
    async fn unlock(&self, key: &Key, owner: &Raw) -> BackendResult<bool> {
        self.inner.unlock(key, owner).await
    }
    async fn get_size(&self, key: &Key) -> BackendResult<i64> {
        self.inner.get_size(key).await
    }
    async fn ping(&self, message: Option<Raw>) -> BackendResult<Raw> {
        self.inner.ping(message).await
    }
    async fn clear(&self) -> BackendResult<()> {
        self.inner.clear().await
    }
    fn on_remove_callback(&self, callback: Arc<dyn RemoveCallback>) {
        self.inner.on_remove_callback(callback)
    }
}

impl BroadcastSource for TestRemote {
    fn subscribe(&self) -> broadcast::Receiver<Invalidate> {
        self.invalidations.subscribe()
    }
}

/// An [`cashier_core::Offload`] that runs every spawned task immediately on
/// the current runtime, for tests that want a listener's work done
/// deterministically rather than scheduled.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateOffload;

impl cashier_core::Offload for ImmediateOffload {
    fn spawn<F>(&self, _kind: impl Into<smol_str::SmolStr>, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(future);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashier_backend::SetCondition;

    #[tokio::test]
    async fn publish_reaches_a_subscriber() {
        let remote = TestRemote::new();
        let mut rx = remote.subscribe();

        remote.set(&Key::new("a"), Raw::from_static(b"1"), None, SetCondition::Always).await.unwrap();
        remote.publish(Invalidate::Keys(vec![Key::new("a")]));

        match rx.recv().await.unwrap() {
            Invalidate::Keys(keys) => assert_eq!(keys, vec![Key::new("a")]),
            Invalidate::Flush => panic!("expected a Keys message"),
        }
    }
}
