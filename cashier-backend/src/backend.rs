//! The core backend trait: the full cache operation contract.
//!
//! [`Backend`] exposes every operation a cache store must support — plain
//! key/value storage, counters, bitfields, sets, sliding-window counters,
//! locks, and scans — directly as trait methods, so any concrete store
//! (in-memory, remote, a middleware wrapper) implements one surface. A
//! [`crate::serializer::Serializer`] sits above this trait and handles
//! turning typed application values into the [`Raw`] bytes these methods
//! move around.
//!
//! Multi-key derived operations (`get_many`, `delete_many`) and
//! `delete_match` have default implementations in terms of the single-key
//! primitives, so a minimal backend only needs to implement the primitives.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cashier_core::{BackendLabel, Command, Key, Raw};

use crate::BackendError;
use crate::compressor::{Compressor, PassthroughCompressor};
use crate::metrics::{self, Timer};

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Type alias for a dynamically dispatched Backend that is Send but not Sync.
pub type UnsyncBackend = dyn Backend + Send;

/// Type alias for a dynamically dispatched Backend that is Send + Sync.
pub type SyncBackend = dyn Backend + Send + Sync;

/// Status of a delete operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    /// Record successfully deleted. The count is the number of keys actually removed.
    Deleted(u32),
    /// Record was not found in the cache.
    Missing,
}

/// Whether a `set` should be unconditional or gated on existing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetCondition {
    /// Always store, regardless of whether the key currently exists.
    #[default]
    Always,
    /// Store only if the key already exists.
    IfExists,
    /// Store only if the key is currently absent.
    IfAbsent,
}

/// TTL for `expire`/`get_expire`, matching the `-2`/`-1`/seconds convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// The key does not exist.
    NotFound,
    /// The key exists with no expiration.
    Unlimited,
    /// The key expires after this duration.
    In(Duration),
}

/// A hook invoked with the keys a backend just removed.
///
/// Used by the tag registry to keep its tag-to-key sets pruned as entries
/// are evicted, expire, or are explicitly deleted.
pub trait RemoveCallback: Send + Sync {
    /// Called with the keys that were just removed, by whatever means.
    fn on_remove(&self, keys: &[Key]);
}

/// The full cache backend operation contract.
///
/// # Dyn-Compatibility
///
/// This trait is dyn-compatible. Blanket implementations are provided for
/// `&dyn Backend`, `Box<dyn Backend>`, `Arc<UnsyncBackend>`, and
/// `Arc<SyncBackend>`, so a backend behind any of these can be used
/// interchangeably.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Backend label for metrics, logging, and prefix routing diagnostics.
    fn label(&self) -> BackendLabel {
        BackendLabel::new_static("backend")
    }

    /// Compressor applied to stored payloads. Default: no compression.
    fn compressor(&self) -> &dyn Compressor {
        &PassthroughCompressor
    }

    /// Stores `value` under `key`, respecting `condition`. `expire` is the
    /// TTL from now, or `None` for no expiration. Returns whether the value
    /// was actually stored (always `true` for [`SetCondition::Always`]).
    async fn set(
        &self,
        key: &Key,
        value: Raw,
        expire: Option<Duration>,
        condition: SetCondition,
    ) -> BackendResult<bool>;

    /// Bulk set with one common TTL for every pair.
    async fn set_many(&self, pairs: &[(Key, Raw)], expire: Option<Duration>) -> BackendResult<()> {
        for (key, value) in pairs {
            self.set(key, value.clone(), expire, SetCondition::Always).await?;
        }
        Ok(())
    }

    /// Reads the value stored at `key`, or `None` on miss.
    async fn get(&self, key: &Key) -> BackendResult<Option<Raw>>;

    /// Reads several keys in one call. The result is the same length and
    /// order as `keys`, `None` for any that miss.
    async fn get_many(&self, keys: &[Key]) -> BackendResult<Vec<Option<Raw>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await?);
        }
        Ok(out)
    }

    /// Returns every stored `(key, value)` pair whose key matches `pattern`
    /// (a glob pattern using `*` as a wildcard).
    async fn get_match(&self, pattern: &str) -> BackendResult<Vec<(Key, Raw)>>;

    /// Returns every stored key matching `pattern` (a glob pattern using `*`
    /// as a wildcard), without reading values.
    async fn scan(&self, pattern: &str) -> BackendResult<Vec<Key>>;

    /// Atomically increments the integer stored at `key` by `amount`
    /// (negative to decrement), returning the new value. If the key is new
    /// and `expire` is set, the TTL is applied atomically with the write.
    async fn incr(&self, key: &Key, amount: i64, expire: Option<Duration>) -> BackendResult<i64>;

    /// Removes `key`. Reports whether it was present.
    async fn delete(&self, key: &Key) -> BackendResult<DeleteStatus>;

    /// Removes several keys in one call, firing remove callbacks once for
    /// the whole batch.
    async fn delete_many(&self, keys: &[Key]) -> BackendResult<DeleteStatus> {
        let mut removed = 0;
        for key in keys {
            if let DeleteStatus::Deleted(n) = self.delete(key).await? {
                removed += n;
            }
        }
        Ok(if removed > 0 {
            DeleteStatus::Deleted(removed)
        } else {
            DeleteStatus::Missing
        })
    }

    /// Removes every key matching `pattern` (a glob pattern using `*`).
    ///
    /// Default implementation scans then deletes; backends with a native
    /// pattern-delete primitive should override this for atomicity.
    async fn delete_match(&self, pattern: &str) -> BackendResult<DeleteStatus> {
        let keys = self.scan(pattern).await?;
        if keys.is_empty() {
            return Ok(DeleteStatus::Missing);
        }
        self.delete_many(&keys).await
    }

    /// Existence test.
    async fn exists(&self, key: &Key) -> BackendResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Sets `key`'s TTL. Returns whether the key existed.
    async fn expire(&self, key: &Key, ttl: Duration) -> BackendResult<bool>;

    /// Reads `key`'s remaining TTL.
    async fn get_expire(&self, key: &Key) -> BackendResult<Expiry>;

    /// Reads `count` bit fields of `size` bits each, starting at bit offsets
    /// `idxs`, from the bitfield stored at `key`.
    async fn get_bits(&self, key: &Key, idxs: &[u32], size: u8) -> BackendResult<Vec<u64>>;

    /// Increments `count` bit fields of `size` bits each by `increments`,
    /// saturating at the field width instead of overflowing, and returns
    /// their new values.
    async fn incr_bits(
        &self,
        key: &Key,
        idxs: &[u32],
        size: u8,
        increments: &[i64],
    ) -> BackendResult<Vec<u64>>;

    /// Sliding-window counter. Removes members scored below `start`, counts
    /// members scored within `[start, end]`; if that count is below
    /// `max_value`, adds one member scored at `end` and refreshes `expire`.
    /// Returns the count after the update.
    async fn slice_incr(
        &self,
        key: &Key,
        start: i64,
        end: i64,
        max_value: u64,
        expire: Duration,
    ) -> BackendResult<u64>;

    /// Adds `members` to the set stored at `key`.
    async fn set_add(&self, key: &Key, members: &[Raw]) -> BackendResult<()>;

    /// Removes `members` from the set stored at `key`.
    async fn set_remove(&self, key: &Key, members: &[Raw]) -> BackendResult<()>;

    /// Removes and returns up to `count` arbitrary members from the set
    /// stored at `key`.
    async fn set_pop(&self, key: &Key, count: usize) -> BackendResult<Vec<Raw>>;

    /// Atomically sets `key` to `owner` only if absent, with TTL `expire`.
    /// Returns whether the lock was acquired.
    async fn set_lock(&self, key: &Key, owner: &Raw, expire: Duration) -> BackendResult<bool>;

    /// Deletes `key` only if its current value equals `owner`
    /// (compare-and-delete). Returns whether it was deleted.
    async fn unlock(&self, key: &Key, owner: &Raw) -> BackendResult<bool>;

    /// Polls whether `key` is locked. If `wait` is set, polls up to that
    /// long, sleeping `step` between attempts.
    async fn is_locked(&self, key: &Key, wait: Option<Duration>, step: Duration) -> BackendResult<bool> {
        let deadline = wait.map(|w| std::time::Instant::now() + w);
        loop {
            if self.exists(key).await? {
                return Ok(true);
            }
            match deadline {
                Some(deadline) if std::time::Instant::now() < deadline => {
                    tokio::time::sleep(step).await;
                }
                _ => return Ok(false),
            }
        }
    }

    /// Size in bytes of the value stored at `key`, or `-1` if the backend
    /// can't report it.
    async fn get_size(&self, key: &Key) -> BackendResult<i64>;

    /// Health check; echoes `message` back (or a fixed payload if `None`).
    async fn ping(&self, message: Option<Raw>) -> BackendResult<Raw>;

    /// Removes every entry this backend owns.
    async fn clear(&self) -> BackendResult<()>;

    /// Registers a hook invoked with the keys a remove (explicit delete,
    /// eviction, or expiry) actually removed.
    fn on_remove_callback(&self, callback: Arc<dyn RemoveCallback>);
}

macro_rules! forward_backend_impl {
    ($self_ty:ty, $deref:expr) => {
        #[async_trait]
        impl Backend for $self_ty {
            fn label(&self) -> BackendLabel {
                $deref(self).label()
            }

            fn compressor(&self) -> &dyn Compressor {
                $deref(self).compressor()
            }

            async fn set(
                &self,
                key: &Key,
                value: Raw,
                expire: Option<Duration>,
                condition: SetCondition,
            ) -> BackendResult<bool> {
                $deref(self).set(key, value, expire, condition).await
            }

            async fn set_many(&self, pairs: &[(Key, Raw)], expire: Option<Duration>) -> BackendResult<()> {
                $deref(self).set_many(pairs, expire).await
            }

            async fn get(&self, key: &Key) -> BackendResult<Option<Raw>> {
                $deref(self).get(key).await
            }

            async fn get_many(&self, keys: &[Key]) -> BackendResult<Vec<Option<Raw>>> {
                $deref(self).get_many(keys).await
            }

            async fn get_match(&self, pattern: &str) -> BackendResult<Vec<(Key, Raw)>> {
                $deref(self).get_match(pattern).await
            }

            async fn scan(&self, pattern: &str) -> BackendResult<Vec<Key>> {
                $deref(self).scan(pattern).await
            }

            async fn incr(&self, key: &Key, amount: i64, expire: Option<Duration>) -> BackendResult<i64> {
                $deref(self).incr(key, amount, expire).await
            }

            async fn delete(&self, key: &Key) -> BackendResult<DeleteStatus> {
                $deref(self).delete(key).await
            }

            async fn delete_many(&self, keys: &[Key]) -> BackendResult<DeleteStatus> {
                $deref(self).delete_many(keys).await
            }

            async fn delete_match(&self, pattern: &str) -> BackendResult<DeleteStatus> {
                $deref(self).delete_match(pattern).await
            }

            async fn exists(&self, key: &Key) -> BackendResult<bool> {
                $deref(self).exists(key).await
            }

            async fn expire(&self, key: &Key, ttl: Duration) -> BackendResult<bool> {
                $deref(self).expire(key, ttl).await
            }

            async fn get_expire(&self, key: &Key) -> BackendResult<Expiry> {
                $deref(self).get_expire(key).await
            }

            async fn get_bits(&self, key: &Key, idxs: &[u32], size: u8) -> BackendResult<Vec<u64>> {
                $deref(self).get_bits(key, idxs, size).await
            }

            async fn incr_bits(
                &self,
                key: &Key,
                idxs: &[u32],
                size: u8,
                increments: &[i64],
            ) -> BackendResult<Vec<u64>> {
                $deref(self).incr_bits(key, idxs, size, increments).await
            }

            async fn slice_incr(
                &self,
                key: &Key,
                start: i64,
                end: i64,
                max_value: u64,
                expire: Duration,
            ) -> BackendResult<u64> {
                $deref(self).slice_incr(key, start, end, max_value, expire).await
            }

            async fn set_add(&self, key: &Key, members: &[Raw]) -> BackendResult<()> {
                $deref(self).set_add(key, members).await
            }

            async fn set_remove(&self, key: &Key, members: &[Raw]) -> BackendResult<()> {
                $deref(self).set_remove(key, members).await
            }

            async fn set_pop(&self, key: &Key, count: usize) -> BackendResult<Vec<Raw>> {
                $deref(self).set_pop(key, count).await
            }

            async fn set_lock(&self, key: &Key, owner: &Raw, expire: Duration) -> BackendResult<bool> {
                $deref(self).set_lock(key, owner, expire).await
            }

            async fn unlock(&self, key: &Key, owner: &Raw) -> BackendResult<bool> {
                $deref(self).unlock(key, owner).await
            }

            async fn is_locked(&self, key: &Key, wait: Option<Duration>, step: Duration) -> BackendResult<bool> {
                $deref(self).is_locked(key, wait, step).await
            }

            async fn get_size(&self, key: &Key) -> BackendResult<i64> {
                $deref(self).get_size(key).await
            }

            async fn ping(&self, message: Option<Raw>) -> BackendResult<Raw> {
                $deref(self).ping(message).await
            }

            async fn clear(&self) -> BackendResult<()> {
                $deref(self).clear().await
            }

            fn on_remove_callback(&self, callback: Arc<dyn RemoveCallback>) {
                $deref(self).on_remove_callback(callback)
            }
        }
    };
}

forward_backend_impl!(&dyn Backend, |s: &&dyn Backend| *s);
forward_backend_impl!(Box<dyn Backend>, |s: &Box<dyn Backend>| &**s);
forward_backend_impl!(Arc<UnsyncBackend>, |s: &Arc<UnsyncBackend>| &**s);
forward_backend_impl!(Arc<SyncBackend>, |s: &Arc<SyncBackend>| &**s);

/// Wraps a backend, recording [`crate::metrics`] for every primitive
/// operation: a per-command counter/duration pair, plus bytes read/written
/// for `get`/`set`. Derived methods (`get_many`, `delete_many`, ...) are
/// metered through the primitives they call, not counted separately.
pub struct Instrumented<B> {
    inner: B,
}

impl<B: Backend> Instrumented<B> {
    /// Wraps `inner` so its operations are recorded under its own [`Backend::label`].
    pub fn new(inner: B) -> Self {
        Self { inner }
    }

    /// Unwraps back to the underlying backend.
    pub fn into_inner(self) -> B {
        self.inner
    }

    async fn timed<T>(
        &self,
        command: Command,
        fut: impl std::future::Future<Output = BackendResult<T>>,
    ) -> BackendResult<T> {
        let timer = Timer::new();
        let label = self.inner.label();
        let result = fut.await;
        metrics::record_operation(label.as_str(), command.as_str(), timer.elapsed());
        if result.is_err() {
            metrics::record_operation_error(label.as_str(), command.as_str());
        }
        result
    }
}

#[async_trait]
impl<B: Backend> Backend for Instrumented<B> {
    fn label(&self) -> BackendLabel {
        self.inner.label()
    }

    fn compressor(&self) -> &dyn Compressor {
        self.inner.compressor()
    }

    async fn set(&self, key: &Key, value: Raw, expire: Option<Duration>, condition: SetCondition) -> BackendResult<bool> {
        let label = self.inner.label();
        let len = value.len();
        let result = self.timed(Command::Set, self.inner.set(key, value, expire, condition)).await;
        if result.is_ok() {
            metrics::record_write_bytes(label.as_str(), len);
        }
        result
    }

    async fn get(&self, key: &Key) -> BackendResult<Option<Raw>> {
        let label = self.inner.label();
        let result = self.timed(Command::Get, self.inner.get(key)).await;
        if let Ok(Some(value)) = &result {
            metrics::record_read_bytes(label.as_str(), value.len());
        }
        result
    }

    async fn get_match(&self, pattern: &str) -> BackendResult<Vec<(Key, Raw)>> {
        self.timed(Command::GetMatch, self.inner.get_match(pattern)).await
    }

    async fn scan(&self, pattern: &str) -> BackendResult<Vec<Key>> {
        self.timed(Command::Scan, self.inner.scan(pattern)).await
    }

    async fn incr(&self, key: &Key, amount: i64, expire: Option<Duration>) -> BackendResult<i64> {
        self.timed(Command::Incr, self.inner.incr(key, amount, expire)).await
    }

    async fn delete(&self, key: &Key) -> BackendResult<DeleteStatus> {
        self.timed(Command::Delete, self.inner.delete(key)).await
    }

    async fn expire(&self, key: &Key, ttl: Duration) -> BackendResult<bool> {
        self.timed(Command::Expire, self.inner.expire(key, ttl)).await
    }

    async fn get_expire(&self, key: &Key) -> BackendResult<Expiry> {
        self.timed(Command::GetExpire, self.inner.get_expire(key)).await
    }

    async fn get_bits(&self, key: &Key, idxs: &[u32], size: u8) -> BackendResult<Vec<u64>> {
        self.timed(Command::GetBits, self.inner.get_bits(key, idxs, size)).await
    }

    async fn incr_bits(&self, key: &Key, idxs: &[u32], size: u8, increments: &[i64]) -> BackendResult<Vec<u64>> {
        self.timed(Command::IncrBits, self.inner.incr_bits(key, idxs, size, increments)).await
    }

    async fn slice_incr(&self, key: &Key, start: i64, end: i64, max_value: u64, expire: Duration) -> BackendResult<u64> {
        self.timed(Command::SliceIncr, self.inner.slice_incr(key, start, end, max_value, expire))
            .await
    }

    async fn set_add(&self, key: &Key, members: &[Raw]) -> BackendResult<()> {
        self.timed(Command::SetAdd, self.inner.set_add(key, members)).await
    }

    async fn set_remove(&self, key: &Key, members: &[Raw]) -> BackendResult<()> {
        self.timed(Command::SetRemove, self.inner.set_remove(key, members)).await
    }

    async fn set_pop(&self, key: &Key, count: usize) -> BackendResult<Vec<Raw>> {
        self.timed(Command::SetPop, self.inner.set_pop(key, count)).await
    }

    async fn set_lock(&self, key: &Key, owner: &Raw, expire: Duration) -> BackendResult<bool> {
        self.timed(Command::SetLock, self.inner.set_lock(key, owner, expire)).await
    }

    async fn unlock(&self, key: &Key, owner: &Raw) -> BackendResult<bool> {
        self.timed(Command::Unlock, self.inner.unlock(key, owner)).await
    }

    async fn get_size(&self, key: &Key) -> BackendResult<i64> {
        self.timed(Command::GetSize, self.inner.get_size(key)).await
    }

    async fn ping(&self, message: Option<Raw>) -> BackendResult<Raw> {
        self.timed(Command::Ping, self.inner.ping(message)).await
    }

    async fn clear(&self) -> BackendResult<()> {
        self.timed(Command::Clear, self.inner.clear()).await
    }

    fn on_remove_callback(&self, callback: Arc<dyn RemoveCallback>) {
        self.inner.on_remove_callback(callback)
    }
}

/// A convenience guard released by dropping it, built atop [`Backend::set_lock`]
/// and [`Backend::unlock`].
///
/// Acquire with [`lock`]; the lock is released either explicitly via
/// [`LockGuard::release`] or, best-effort, when the guard is dropped.
/// Because [`Backend::unlock`] is async, the drop path can only fire a
/// detached release and cannot guarantee it completes — call
/// [`LockGuard::release`] explicitly wherever the outcome matters.
pub struct LockGuard<B: Backend + Clone + 'static> {
    backend: B,
    key: Key,
    owner: Raw,
    released: bool,
}

impl<B: Backend + Clone + 'static> LockGuard<B> {
    /// Releases the lock now, returning whether it was actually held by this owner.
    pub async fn release(mut self) -> BackendResult<bool> {
        self.released = true;
        self.backend.unlock(&self.key, &self.owner).await
    }
}

impl<B: Backend + Clone + 'static> Drop for LockGuard<B> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let backend = self.backend.clone();
        let key = self.key.clone();
        let owner = self.owner.clone();
        tokio::spawn(async move {
            let _ = backend.unlock(&key, &owner).await;
        });
    }
}

/// Attempts to acquire a lock at `key`, returning a [`LockGuard`] on success.
pub async fn lock<B>(backend: B, key: Key, owner: Raw, expire: Duration) -> BackendResult<Option<LockGuard<B>>>
where
    B: Backend + Clone + 'static,
{
    if backend.set_lock(&key, &owner, expire).await? {
        Ok(Some(LockGuard {
            backend,
            key,
            owner,
            released: false,
        }))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;

    #[test]
    fn delete_status_variants_are_distinguishable() {
        assert_ne!(DeleteStatus::Deleted(1), DeleteStatus::Missing);
        assert_eq!(DeleteStatus::Deleted(2), DeleteStatus::Deleted(2));
    }

    #[test]
    fn set_condition_defaults_to_always() {
        assert_eq!(SetCondition::default(), SetCondition::Always);
    }

    #[derive(Clone, Default)]
    struct DummyBackend {
        store: Arc<DashMap<Key, Raw>>,
    }

    #[async_trait]
    impl Backend for DummyBackend {
        async fn set(&self, key: &Key, value: Raw, _expire: Option<Duration>, condition: SetCondition) -> BackendResult<bool> {
            let exists = self.store.contains_key(key);
            let should_store = match condition {
                SetCondition::Always => true,
                SetCondition::IfExists => exists,
                SetCondition::IfAbsent => !exists,
            };
            if should_store {
                self.store.insert(key.clone(), value);
            }
            Ok(should_store)
        }

        async fn get(&self, key: &Key) -> BackendResult<Option<Raw>> {
            Ok(self.store.get(key).map(|v| v.clone()))
        }

        async fn get_match(&self, _pattern: &str) -> BackendResult<Vec<(Key, Raw)>> {
            Ok(self.store.iter().map(|e| (e.key().clone(), e.value().clone())).collect())
        }

        async fn scan(&self, pattern: &str) -> BackendResult<Vec<Key>> {
            let prefix = pattern.trim_end_matches('*');
            Ok(self
                .store
                .iter()
                .map(|e| e.key().clone())
                .filter(|k| k.as_str().starts_with(prefix))
                .collect())
        }

        async fn incr(&self, _key: &Key, amount: i64, _expire: Option<Duration>) -> BackendResult<i64> {
            Ok(amount)
        }

        async fn delete(&self, key: &Key) -> BackendResult<DeleteStatus> {
            Ok(if self.store.remove(key).is_some() {
                DeleteStatus::Deleted(1)
            } else {
                DeleteStatus::Missing
            })
        }

        async fn expire(&self, _key: &Key, _ttl: Duration) -> BackendResult<bool> {
            Ok(true)
        }

        async fn get_expire(&self, key: &Key) -> BackendResult<Expiry> {
            Ok(if self.store.contains_key(key) {
                Expiry::Unlimited
            } else {
                Expiry::NotFound
            })
        }

        async fn get_bits(&self, _key: &Key, idxs: &[u32], _size: u8) -> BackendResult<Vec<u64>> {
            Ok(vec![0; idxs.len()])
        }

        async fn incr_bits(&self, _key: &Key, idxs: &[u32], _size: u8, _increments: &[i64]) -> BackendResult<Vec<u64>> {
            Ok(vec![0; idxs.len()])
        }

        async fn slice_incr(&self, _key: &Key, _start: i64, _end: i64, _max_value: u64, _expire: Duration) -> BackendResult<u64> {
            Ok(1)
        }

        async fn set_add(&self, _key: &Key, _members: &[Raw]) -> BackendResult<()> {
            Ok(())
        }

        async fn set_remove(&self, _key: &Key, _members: &[Raw]) -> BackendResult<()> {
            Ok(())
        }

        async fn set_pop(&self, _key: &Key, _count: usize) -> BackendResult<Vec<Raw>> {
            Ok(Vec::new())
        }

        async fn set_lock(&self, key: &Key, owner: &Raw, _expire: Duration) -> BackendResult<bool> {
            self.set(key, owner.clone(), None, SetCondition::IfAbsent).await
        }

        async fn unlock(&self, key: &Key, owner: &Raw) -> BackendResult<bool> {
            match self.store.get(key) {
                Some(v) if *v == *owner => {
                    drop(v);
                    self.store.remove(key);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn get_size(&self, _key: &Key) -> BackendResult<i64> {
            Ok(-1)
        }

        async fn ping(&self, message: Option<Raw>) -> BackendResult<Raw> {
            Ok(message.unwrap_or_default())
        }

        async fn clear(&self) -> BackendResult<()> {
            self.store.clear();
            Ok(())
        }

        fn on_remove_callback(&self, _callback: Arc<dyn RemoveCallback>) {}
    }

    fn key(s: &str) -> Key {
        Key::new(s)
    }

    #[tokio::test]
    async fn get_many_preserves_order_and_misses() {
        let backend = DummyBackend::default();
        backend.set(&key("a"), Raw::from_static(b"1"), None, SetCondition::Always).await.unwrap();
        backend.set(&key("c"), Raw::from_static(b"3"), None, SetCondition::Always).await.unwrap();

        let values = backend.get_many(&[key("a"), key("b"), key("c")]).await.unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[0], Some(Raw::from_static(b"1")));
        assert_eq!(values[1], None);
        assert_eq!(values[2], Some(Raw::from_static(b"3")));
    }

    #[tokio::test]
    async fn delete_many_aggregates_count_and_reports_missing() {
        let backend = DummyBackend::default();
        backend.set(&key("a"), Raw::from_static(b"1"), None, SetCondition::Always).await.unwrap();
        backend.set(&key("b"), Raw::from_static(b"2"), None, SetCondition::Always).await.unwrap();

        let status = backend.delete_many(&[key("a"), key("b"), key("missing")]).await.unwrap();
        assert_eq!(status, DeleteStatus::Deleted(2));

        let status = backend.delete_many(&[key("still-missing")]).await.unwrap();
        assert_eq!(status, DeleteStatus::Missing);
    }

    #[tokio::test]
    async fn delete_match_scans_then_deletes() {
        let backend = DummyBackend::default();
        backend.set(&key("user:1"), Raw::from_static(b"a"), None, SetCondition::Always).await.unwrap();
        backend.set(&key("user:2"), Raw::from_static(b"b"), None, SetCondition::Always).await.unwrap();
        backend.set(&key("order:1"), Raw::from_static(b"c"), None, SetCondition::Always).await.unwrap();

        let status = backend.delete_match("user:*").await.unwrap();
        assert_eq!(status, DeleteStatus::Deleted(2));
        assert!(backend.exists(&key("order:1")).await.unwrap());
        assert!(!backend.exists(&key("user:1")).await.unwrap());
    }

    #[tokio::test]
    async fn exists_reflects_presence() {
        let backend = DummyBackend::default();
        assert!(!backend.exists(&key("a")).await.unwrap());
        backend.set(&key("a"), Raw::from_static(b"1"), None, SetCondition::Always).await.unwrap();
        assert!(backend.exists(&key("a")).await.unwrap());
    }

    #[tokio::test]
    async fn is_locked_returns_immediately_without_wait() {
        let backend = DummyBackend::default();
        assert!(!backend.is_locked(&key("lock"), None, Duration::from_millis(10)).await.unwrap());
        backend.set(&key("lock"), Raw::from_static(b"owner"), None, SetCondition::Always).await.unwrap();
        assert!(backend.is_locked(&key("lock"), None, Duration::from_millis(10)).await.unwrap());
    }

    #[tokio::test]
    async fn is_locked_polls_until_deadline() {
        let backend = DummyBackend::default();
        let waiter = backend.clone();
        let handle = tokio::spawn(async move {
            waiter.is_locked(&key("lock"), Some(Duration::from_millis(200)), Duration::from_millis(10)).await
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        backend.set(&key("lock"), Raw::from_static(b"owner"), None, SetCondition::Always).await.unwrap();

        assert!(handle.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn lock_guard_releases_on_explicit_release() {
        let backend = DummyBackend::default();
        let guard = lock(backend, key("resource"), Raw::from_static(b"owner-a"), Duration::from_secs(5))
            .await
            .unwrap()
            .expect("lock should be acquired");

        assert!(guard.release().await.unwrap());
    }

    #[tokio::test]
    async fn lock_is_exclusive() {
        let backend = DummyBackend::default();
        let first = lock(backend.clone(), key("resource"), Raw::from_static(b"owner-a"), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(first.is_some());

        let second = lock(backend, key("resource"), Raw::from_static(b"owner-b"), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(second.is_none());
    }
}
