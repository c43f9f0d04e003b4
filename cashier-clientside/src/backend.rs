//! The client-side hybrid backend: a remote store mirrored into a local
//! one, kept coherent by a broadcast invalidation channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cashier_backend::{Backend, BackendResult, DeleteStatus, Expiry, RemoveCallback, SetCondition};
use cashier_core::{BackendLabel, Key, Offload, Raw};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{Notify, oneshot};

use crate::broadcast::{BroadcastSource, Invalidate};

/// How long a listener waits before resubscribing after the channel drops.
pub const DEFAULT_RECONNECT_WAIT: Duration = Duration::from_secs(1);

/// Composes a remote backend `R` with a local backend `L`, read-through on
/// miss and write-through on every mutation, invalidated by `R`'s broadcast
/// channel so other clients' writes eventually evict the local mirror too.
///
/// `R` must additionally implement [`BroadcastSource`]; this keeps the
/// hybrid generic over any backend exposing that capability rather than a
/// concrete wire client.
pub struct ClientSideBackend<R, L> {
    label: BackendLabel,
    remote: R,
    local: L,
    prefix: Arc<str>,
    recently_updated: Arc<DashMap<Key, Instant>>,
    recently_updated_ttl: Duration,
    known_absent: Arc<DashMap<Key, ()>>,
    reconnect_wait: Duration,
    ready: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    stopped: Arc<Mutex<Option<oneshot::Receiver<()>>>>,
    remove_callback: Arc<Mutex<Option<Arc<dyn RemoveCallback>>>>,
}

impl<R, L> ClientSideBackend<R, L>
where
    R: Backend + Clone + BroadcastSource + 'static,
    L: Backend + Clone + 'static,
{
    /// Starts a [`crate::builder::ClientSideBackendBuilder`] with default settings.
    pub fn builder(remote: R, local: L, prefix: impl Into<Arc<str>>) -> crate::builder::ClientSideBackendBuilder<R, L> {
        crate::builder::ClientSideBackendBuilder::new(remote, local, prefix)
    }

    pub(crate) fn new(label: BackendLabel, remote: R, local: L, prefix: Arc<str>, recently_updated_ttl: Duration, reconnect_wait: Duration) -> Self {
        Self {
            label,
            remote,
            local,
            prefix,
            recently_updated: Arc::new(DashMap::new()),
            recently_updated_ttl,
            known_absent: Arc::new(DashMap::new()),
            reconnect_wait,
            ready: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            stopped: Arc::new(Mutex::new(None)),
            remove_callback: Arc::new(Mutex::new(None)),
        }
    }

    /// True once the invalidation subscription is established. While
    /// unready, reads fall back to the remote store rather than trusting
    /// the (possibly stale) local mirror.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Spawns the invalidation listener through `offload`. Resubscribes
    /// with [`Self::reconnect_wait`] between attempts if the channel drops;
    /// on each drop the local mirror is cleared since missed messages can't
    /// be replayed.
    pub fn spawn_listener<O: Offload + 'static>(&self, offload: &O) {
        let remote = self.remote.clone();
        let local = self.local.clone();
        let prefix = self.prefix.clone();
        let recently_updated = self.recently_updated.clone();
        let known_absent = self.known_absent.clone();
        let ready = self.ready.clone();
        let reconnect_wait = self.reconnect_wait;
        let shutdown = self.shutdown.clone();
        let remove_callback = self.remove_callback.clone();

        let (tx, rx) = oneshot::channel();
        *self.stopped.lock() = Some(rx);

        offload.spawn("clientside-listener", async move {
            'reconnect: loop {
                let mut receiver = remote.subscribe();
                ready.store(true, Ordering::Release);

                loop {
                    tokio::select! {
                        _ = shutdown.notified() => {
                            let _ = tx.send(());
                            return;
                        }
                        message = receiver.recv() => {
                            match message {
                                Ok(Invalidate::Keys(keys)) => {
                                    let mut removed = Vec::new();
                                    for full_key in keys {
                                        let Some(stripped) = full_key.as_str().strip_prefix(prefix.as_ref()) else { continue };
                                        let key = Key::new(stripped);
                                        if let Some((_, deadline)) = recently_updated.remove(&key) {
                                            if deadline >= Instant::now() {
                                                continue;
                                            }
                                        }
                                        known_absent.remove(&key);
                                        let _ = local.delete(&key).await;
                                        removed.push(key);
                                    }
                                    if !removed.is_empty() {
                                        if let Some(callback) = remove_callback.lock().as_ref() {
                                            callback.on_remove(&removed);
                                        }
                                    }
                                }
                                Ok(Invalidate::Flush) => {
                                    let _ = local.clear().await;
                                    known_absent.clear();
                                }
                                Err(_) => break,
                            }
                        }
                    }
                }

                ready.store(false, Ordering::Release);
                let _ = local.clear().await;
                known_absent.clear();
                tokio::select! {
                    _ = shutdown.notified() => {
                        let _ = tx.send(());
                        break 'reconnect;
                    }
                    _ = tokio::time::sleep(reconnect_wait) => {}
                }
            }
        });
    }

    /// Signals the listener to stop and waits for it to exit.
    pub async fn close(&self) {
        self.shutdown.notify_waiters();
        let receiver = self.stopped.lock().take();
        if let Some(receiver) = receiver {
            let _ = receiver.await;
        }
    }

    fn remote_key(&self, key: &Key) -> Key {
        Key::new(format!("{}{}", self.prefix, key.as_str()))
    }

    fn strip_prefix(&self, full: &Key) -> Option<Key> {
        full.as_str().strip_prefix(self.prefix.as_ref()).map(Key::new)
    }

    fn mark_recently_updated(&self, key: &Key) {
        self.recently_updated.insert(key.clone(), Instant::now() + self.recently_updated_ttl);
    }
}

#[async_trait]
impl<R, L> Backend for ClientSideBackend<R, L>
where
    R: Backend + Clone + BroadcastSource + 'static,
    L: Backend + Clone + 'static,
{
    fn label(&self) -> BackendLabel {
        self.label.clone()
    }

    async fn set(&self, key: &Key, value: Raw, expire: Option<Duration>, condition: SetCondition) -> BackendResult<bool> {
        self.local.set(key, value.clone(), expire, SetCondition::Always).await?;
        self.known_absent.remove(key);
        self.mark_recently_updated(key);
        self.remote.set(&self.remote_key(key), value, expire, condition).await
    }

    async fn get(&self, key: &Key) -> BackendResult<Option<Raw>> {
        if self.is_ready() {
            if let Some(raw) = self.local.get(key).await? {
                return Ok(Some(raw));
            }
            if self.known_absent.contains_key(key) {
                return Ok(None);
            }
        }

        match self.remote.get(&self.remote_key(key)).await? {
            Some(raw) => {
                self.local.set(key, raw.clone(), None, SetCondition::Always).await?;
                self.known_absent.remove(key);
                Ok(Some(raw))
            }
            None => {
                self.known_absent.insert(key.clone(), ());
                Ok(None)
            }
        }
    }

    async fn get_match(&self, pattern: &str) -> BackendResult<Vec<(Key, Raw)>> {
        let remote_pattern = format!("{}{}", self.prefix, pattern);
        let matched = self.remote.get_match(&remote_pattern).await?;
        Ok(matched.into_iter().filter_map(|(key, value)| self.strip_prefix(&key).map(|k| (k, value))).collect())
    }

    async fn scan(&self, pattern: &str) -> BackendResult<Vec<Key>> {
        let remote_pattern = format!("{}{}", self.prefix, pattern);
        let keys = self.remote.scan(&remote_pattern).await?;
        Ok(keys.into_iter().filter_map(|key| self.strip_prefix(&key)).collect())
    }

    async fn incr(&self, key: &Key, amount: i64, expire: Option<Duration>) -> BackendResult<i64> {
        self.mark_recently_updated(key);
        let result = self.remote.incr(&self.remote_key(key), amount, expire).await?;
        self.local.set(key, Raw::copy_from_slice(&result.to_le_bytes()), expire, SetCondition::Always).await?;
        self.known_absent.remove(key);
        Ok(result)
    }

    async fn delete(&self, key: &Key) -> BackendResult<DeleteStatus> {
        self.mark_recently_updated(key);
        let _ = self.local.delete(key).await;
        self.known_absent.insert(key.clone(), ());
        self.remote.delete(&self.remote_key(key)).await
    }

    async fn expire(&self, key: &Key, ttl: Duration) -> BackendResult<bool> {
        self.mark_recently_updated(key);
        let result = self.remote.expire(&self.remote_key(key), ttl).await?;
        if result {
            let _ = self.local.expire(key, ttl).await;
        }
        Ok(result)
    }

    async fn get_expire(&self, key: &Key) -> BackendResult<Expiry> {
        self.remote.get_expire(&self.remote_key(key)).await
    }

    async fn get_bits(&self, key: &Key, idxs: &[u32], size: u8) -> BackendResult<Vec<u64>> {
        self.remote.get_bits(&self.remote_key(key), idxs, size).await
    }

    async fn incr_bits(&self, key: &Key, idxs: &[u32], size: u8, increments: &[i64]) -> BackendResult<Vec<u64>> {
        self.remote.incr_bits(&self.remote_key(key), idxs, size, increments).await
    }

    async fn slice_incr(&self, key: &Key, start: i64, end: i64, max_value: u64, expire: Duration) -> BackendResult<u64> {
        self.remote.slice_incr(&self.remote_key(key), start, end, max_value, expire).await
    }

    async fn set_add(&self, key: &Key, members: &[Raw]) -> BackendResult<()> {
        self.remote.set_add(&self.remote_key(key), members).await
    }

    async fn set_remove(&self, key: &Key, members: &[Raw]) -> BackendResult<()> {
        self.remote.set_remove(&self.remote_key(key), members).await
    }

    async fn set_pop(&self, key: &Key, count: usize) -> BackendResult<Vec<Raw>> {
        self.remote.set_pop(&self.remote_key(key), count).await
    }

    async fn set_lock(&self, key: &Key, owner: &Raw, expire: Duration) -> BackendResult<bool> {
        self.remote.set_lock(&self.remote_key(key), owner, expire).await
    }

    async fn unlock(&self, key: &Key, owner: &Raw) -> BackendResult<bool> {
        self.remote.unlock(&self.remote_key(key), owner).await
    }

    async fn get_size(&self, key: &Key) -> BackendResult<i64> {
        self.remote.get_size(&self.remote_key(key)).await
    }

    async fn ping(&self, message: Option<Raw>) -> BackendResult<Raw> {
        self.remote.ping(message).await
    }

    async fn clear(&self) -> BackendResult<()> {
        self.known_absent.clear();
        self.local.clear().await?;
        self.remote.clear().await
    }

    fn on_remove_callback(&self, callback: Arc<dyn RemoveCallback>) {
        *self.remove_callback.lock() = Some(callback);
    }
}

impl<R: Clone, L: Clone> Clone for ClientSideBackend<R, L> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            remote: self.remote.clone(),
            local: self.local.clone(),
            prefix: self.prefix.clone(),
            recently_updated: self.recently_updated.clone(),
            recently_updated_ttl: self.recently_updated_ttl,
            known_absent: self.known_absent.clone(),
            reconnect_wait: self.reconnect_wait,
            ready: self.ready.clone(),
            shutdown: self.shutdown.clone(),
            stopped: self.stopped.clone(),
            remove_callback: self.remove_callback.clone(),
        }
    }
}
