//! Default middlewares wired around every registered backend.
//!
//! A middleware is, concretely, a [`Backend`] wrapper: it implements the
//! same trait as the thing it wraps and forwards to it, substituting its
//! own behavior at the points it cares about. The facade composes these
//! wrappers around a backend once, at registration time, rather than
//! re-folding a middleware list on every call — this is the same shape as
//! [`cashier_backend::Instrumented`], just generalized past metrics.
//!
//! Two middlewares are always present, innermost first: [`Guarded`] (disable
//! control + invalidate-further) and [`AutoInit`] (lazy one-time setup).
//! User middlewares wrap outside both, so they observe a fully-initialized,
//! already-guarded backend.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cashier_backend::{Backend, BackendResult, Compressor, DeleteStatus, Expiry, RemoveCallback, SetCondition};
use cashier_core::{BackendLabel, Command, Key, Raw};
use tokio::sync::OnceCell;

use crate::context;

/// A transformation applied to a backend at registration time.
///
/// Implement this to add cross-cutting behavior (retries, request logging,
/// an application-specific circuit breaker) to every command that reaches a
/// registered backend, without touching the backend's own implementation.
pub trait Middleware: Send + Sync {
    /// Wraps `backend`, returning the wrapped form.
    fn wrap(&self, backend: Arc<cashier_backend::SyncBackend>) -> Arc<cashier_backend::SyncBackend>;
}

/// Disable-control and invalidate-further, combined in one wrapper since
/// both are unconditional, always-present, cheap checks.
///
/// - Disable-control: if [`cashier_core::disable::is_disabled`] reports the
///   command disabled in the current task, the backend is not touched and a
///   neutral default is returned.
/// - Invalidate-further: if [`context::is_invalidating_further`] is set,
///   `get`/`get_many`/`get_match`/`exists` delete the key(s) they were asked
///   to read and report a miss, instead of serving (possibly stale) cached
///   data to a caller that asked to bypass the cache.
pub struct Guarded<B> {
    inner: B,
}

impl<B: Backend> Guarded<B> {
    /// Wraps `inner` with disable-control and invalidate-further.
    pub fn new(inner: B) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<B: Backend> Backend for Guarded<B> {
    fn label(&self) -> BackendLabel {
        self.inner.label()
    }

    fn compressor(&self) -> &dyn Compressor {
        self.inner.compressor()
    }

    async fn set(&self, key: &Key, value: Raw, expire: Option<Duration>, condition: SetCondition) -> BackendResult<bool> {
        if cashier_core::disable::is_disabled(Command::Set) {
            return Ok(false);
        }
        self.inner.set(key, value, expire, condition).await
    }

    async fn set_many(&self, pairs: &[(Key, Raw)], expire: Option<Duration>) -> BackendResult<()> {
        if cashier_core::disable::is_disabled(Command::SetMany) {
            return Ok(());
        }
        self.inner.set_many(pairs, expire).await
    }

    async fn get(&self, key: &Key) -> BackendResult<Option<Raw>> {
        if cashier_core::disable::is_disabled(Command::Get) {
            return Ok(None);
        }
        if context::is_invalidating_further() {
            self.inner.delete(key).await?;
            return Ok(None);
        }
        self.inner.get(key).await
    }

    async fn get_many(&self, keys: &[Key]) -> BackendResult<Vec<Option<Raw>>> {
        if cashier_core::disable::is_disabled(Command::GetMany) {
            return Ok(vec![None; keys.len()]);
        }
        if context::is_invalidating_further() {
            self.inner.delete_many(keys).await?;
            return Ok(vec![None; keys.len()]);
        }
        self.inner.get_many(keys).await
    }

    async fn get_match(&self, pattern: &str) -> BackendResult<Vec<(Key, Raw)>> {
        if cashier_core::disable::is_disabled(Command::GetMatch) {
            return Ok(Vec::new());
        }
        if context::is_invalidating_further() {
            self.inner.delete_match(pattern).await?;
            return Ok(Vec::new());
        }
        self.inner.get_match(pattern).await
    }

    async fn scan(&self, pattern: &str) -> BackendResult<Vec<Key>> {
        if cashier_core::disable::is_disabled(Command::Scan) {
            return Ok(Vec::new());
        }
        self.inner.scan(pattern).await
    }

    async fn incr(&self, key: &Key, amount: i64, expire: Option<Duration>) -> BackendResult<i64> {
        if cashier_core::disable::is_disabled(Command::Incr) {
            return Ok(amount);
        }
        self.inner.incr(key, amount, expire).await
    }

    async fn delete(&self, key: &Key) -> BackendResult<DeleteStatus> {
        if cashier_core::disable::is_disabled(Command::Delete) {
            return Ok(DeleteStatus::Missing);
        }
        self.inner.delete(key).await
    }

    async fn delete_many(&self, keys: &[Key]) -> BackendResult<DeleteStatus> {
        if cashier_core::disable::is_disabled(Command::DeleteMany) {
            return Ok(DeleteStatus::Missing);
        }
        self.inner.delete_many(keys).await
    }

    async fn delete_match(&self, pattern: &str) -> BackendResult<DeleteStatus> {
        if cashier_core::disable::is_disabled(Command::DeleteMatch) {
            return Ok(DeleteStatus::Missing);
        }
        self.inner.delete_match(pattern).await
    }

    async fn exists(&self, key: &Key) -> BackendResult<bool> {
        if cashier_core::disable::is_disabled(Command::Exists) {
            return Ok(false);
        }
        if context::is_invalidating_further() {
            self.inner.delete(key).await?;
            return Ok(false);
        }
        self.inner.exists(key).await
    }

    async fn expire(&self, key: &Key, ttl: Duration) -> BackendResult<bool> {
        if cashier_core::disable::is_disabled(Command::Expire) {
            return Ok(false);
        }
        self.inner.expire(key, ttl).await
    }

    async fn get_expire(&self, key: &Key) -> BackendResult<Expiry> {
        if cashier_core::disable::is_disabled(Command::GetExpire) {
            return Ok(Expiry::NotFound);
        }
        self.inner.get_expire(key).await
    }

    async fn get_bits(&self, key: &Key, idxs: &[u32], size: u8) -> BackendResult<Vec<u64>> {
        if cashier_core::disable::is_disabled(Command::GetBits) {
            return Ok(vec![0; idxs.len()]);
        }
        self.inner.get_bits(key, idxs, size).await
    }

    async fn incr_bits(&self, key: &Key, idxs: &[u32], size: u8, increments: &[i64]) -> BackendResult<Vec<u64>> {
        if cashier_core::disable::is_disabled(Command::IncrBits) {
            return Ok(vec![0; idxs.len()]);
        }
        self.inner.incr_bits(key, idxs, size, increments).await
    }

    async fn slice_incr(&self, key: &Key, start: i64, end: i64, max_value: u64, expire: Duration) -> BackendResult<u64> {
        if cashier_core::disable::is_disabled(Command::SliceIncr) {
            return Ok(0);
        }
        self.inner.slice_incr(key, start, end, max_value, expire).await
    }

    async fn set_add(&self, key: &Key, members: &[Raw]) -> BackendResult<()> {
        if cashier_core::disable::is_disabled(Command::SetAdd) {
            return Ok(());
        }
        self.inner.set_add(key, members).await
    }

    async fn set_remove(&self, key: &Key, members: &[Raw]) -> BackendResult<()> {
        if cashier_core::disable::is_disabled(Command::SetRemove) {
            return Ok(());
        }
        self.inner.set_remove(key, members).await
    }

    async fn set_pop(&self, key: &Key, count: usize) -> BackendResult<Vec<Raw>> {
        if cashier_core::disable::is_disabled(Command::SetPop) {
            return Ok(Vec::new());
        }
        self.inner.set_pop(key, count).await
    }

    async fn set_lock(&self, key: &Key, owner: &Raw, expire: Duration) -> BackendResult<bool> {
        if cashier_core::disable::is_disabled(Command::SetLock) {
            return Ok(true);
        }
        self.inner.set_lock(key, owner, expire).await
    }

    async fn unlock(&self, key: &Key, owner: &Raw) -> BackendResult<bool> {
        if cashier_core::disable::is_disabled(Command::Unlock) {
            return Ok(true);
        }
        self.inner.unlock(key, owner).await
    }

    async fn is_locked(&self, key: &Key, wait: Option<Duration>, step: Duration) -> BackendResult<bool> {
        if cashier_core::disable::is_disabled(Command::IsLocked) {
            return Ok(false);
        }
        self.inner.is_locked(key, wait, step).await
    }

    async fn get_size(&self, key: &Key) -> BackendResult<i64> {
        if cashier_core::disable::is_disabled(Command::GetSize) {
            return Ok(-1);
        }
        self.inner.get_size(key).await
    }

    async fn ping(&self, message: Option<Raw>) -> BackendResult<Raw> {
        self.inner.ping(message).await
    }

    async fn clear(&self) -> BackendResult<()> {
        if cashier_core::disable::is_disabled(Command::Clear) {
            return Ok(());
        }
        self.inner.clear().await
    }

    fn on_remove_callback(&self, callback: Arc<dyn RemoveCallback>) {
        self.inner.on_remove_callback(callback);
    }
}

type InitFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Runs a one-time async setup hook before the first operation reaches the
/// wrapped backend, then never again.
///
/// Most backends in this crate construct themselves ready to use, so this
/// is mainly for backends whose setup is itself asynchronous (e.g. the
/// client-side hybrid backend's broadcast subscriber).
pub struct AutoInit<B> {
    inner: B,
    once: OnceCell<()>,
    init: Box<dyn Fn() -> InitFuture + Send + Sync>,
}

impl<B: Backend> AutoInit<B> {
    /// Wraps `inner`, running `init` exactly once before its first call.
    pub fn new<F, Fut>(inner: B, init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            inner,
            once: OnceCell::new(),
            init: Box::new(move || Box::pin(init())),
        }
    }

    async fn ensure_init(&self) {
        self.once.get_or_init(|| (self.init)()).await;
    }
}

#[async_trait]
impl<B: Backend> Backend for AutoInit<B> {
    fn label(&self) -> BackendLabel {
        self.inner.label()
    }

    fn compressor(&self) -> &dyn Compressor {
        self.inner.compressor()
    }

    async fn set(&self, key: &Key, value: Raw, expire: Option<Duration>, condition: SetCondition) -> BackendResult<bool> {
        self.ensure_init().await;
        self.inner.set(key, value, expire, condition).await
    }

    async fn set_many(&self, pairs: &[(Key, Raw)], expire: Option<Duration>) -> BackendResult<()> {
        self.ensure_init().await;
        self.inner.set_many(pairs, expire).await
    }

    async fn get(&self, key: &Key) -> BackendResult<Option<Raw>> {
        self.ensure_init().await;
        self.inner.get(key).await
    }

    async fn get_many(&self, keys: &[Key]) -> BackendResult<Vec<Option<Raw>>> {
        self.ensure_init().await;
        self.inner.get_many(keys).await
    }

    async fn get_match(&self, pattern: &str) -> BackendResult<Vec<(Key, Raw)>> {
        self.ensure_init().await;
        self.inner.get_match(pattern).await
    }

    async fn scan(&self, pattern: &str) -> BackendResult<Vec<Key>> {
        self.ensure_init().await;
        self.inner.scan(pattern).await
    }

    async fn incr(&self, key: &Key, amount: i64, expire: Option<Duration>) -> BackendResult<i64> {
        self.ensure_init().await;
        self.inner.incr(key, amount, expire).await
    }

    async fn delete(&self, key: &Key) -> BackendResult<DeleteStatus> {
        self.ensure_init().await;
        self.inner.delete(key).await
    }

    async fn delete_many(&self, keys: &[Key]) -> BackendResult<DeleteStatus> {
        self.ensure_init().await;
        self.inner.delete_many(keys).await
    }

    async fn delete_match(&self, pattern: &str) -> BackendResult<DeleteStatus> {
        self.ensure_init().await;
        self.inner.delete_match(pattern).await
    }

    async fn exists(&self, key: &Key) -> BackendResult<bool> {
        self.ensure_init().await;
        self.inner.exists(key).await
    }

    async fn expire(&self, key: &Key, ttl: Duration) -> BackendResult<bool> {
        self.ensure_init().await;
        self.inner.expire(key, ttl).await
    }

    async fn get_expire(&self, key: &Key) -> BackendResult<Expiry> {
        self.ensure_init().await;
        self.inner.get_expire(key).await
    }

    async fn get_bits(&self, key: &Key, idxs: &[u32], size: u8) -> BackendResult<Vec<u64>> {
        self.ensure_init().await;
        self.inner.get_bits(key, idxs, size).await
    }

    async fn incr_bits(&self, key: &Key, idxs: &[u32], size: u8, increments: &[i64]) -> BackendResult<Vec<u64>> {
        self.ensure_init().await;
        self.inner.incr_bits(key, idxs, size, increments).await
    }

    async fn slice_incr(&self, key: &Key, start: i64, end: i64, max_value: u64, expire: Duration) -> BackendResult<u64> {
        self.ensure_init().await;
        self.inner.slice_incr(key, start, end, max_value, expire).await
    }

    async fn set_add(&self, key: &Key, members: &[Raw]) -> BackendResult<()> {
        self.ensure_init().await;
        self.inner.set_add(key, members).await
    }

    async fn set_remove(&self, key: &Key, members: &[Raw]) -> BackendResult<()> {
        self.ensure_init().await;
        self.inner.set_remove(key, members).await
    }

    async fn set_pop(&self, key: &Key, count: usize) -> BackendResult<Vec<Raw>> {
        self.ensure_init().await;
        self.inner.set_pop(key, count).await
    }

    async fn set_lock(&self, key: &Key, owner: &Raw, expire: Duration) -> BackendResult<bool> {
        self.ensure_init().await;
        self.inner.set_lock(key, owner, expire).await
    }

    async fn unlock(&self, key: &Key, owner: &Raw) -> BackendResult<bool> {
        self.ensure_init().await;
        self.inner.unlock(key, owner).await
    }

    async fn is_locked(&self, key: &Key, wait: Option<Duration>, step: Duration) -> BackendResult<bool> {
        self.ensure_init().await;
        self.inner.is_locked(key, wait, step).await
    }

    async fn get_size(&self, key: &Key) -> BackendResult<i64> {
        self.ensure_init().await;
        self.inner.get_size(key).await
    }

    async fn ping(&self, message: Option<Raw>) -> BackendResult<Raw> {
        self.ensure_init().await;
        self.inner.ping(message).await
    }

    async fn clear(&self) -> BackendResult<()> {
        self.ensure_init().await;
        self.inner.clear().await
    }

    fn on_remove_callback(&self, callback: Arc<dyn RemoveCallback>) {
        self.inner.on_remove_callback(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashier_core::disabling;
    use dashmap::DashMap;

    #[derive(Clone, Default)]
    struct DummyBackend {
        store: Arc<DashMap<Key, Raw>>,
    }

    #[async_trait]
    impl Backend for DummyBackend {
        async fn set(&self, key: &Key, value: Raw, _expire: Option<Duration>, _condition: SetCondition) -> BackendResult<bool> {
            self.store.insert(key.clone(), value);
            Ok(true)
        }
        async fn get(&self, key: &Key) -> BackendResult<Option<Raw>> {
            Ok(self.store.get(key).map(|v| v.clone()))
        }
        async fn get_match(&self, _pattern: &str) -> BackendResult<Vec<(Key, Raw)>> {
            Ok(Vec::new())
        }
        async fn scan(&self, _pattern: &str) -> BackendResult<Vec<Key>> {
            Ok(Vec::new())
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
        async fn get_expire(&self, _key: &Key) -> BackendResult<Expiry> {
            Ok(Expiry::Unlimited)
        }
        async fn get_bits(&self, _key: &Key, idxs: &[u32], _size: u8) -> BackendResult<Vec<u64>> {
            Ok(vec![0; idxs.len()])
        }
        async fn incr_bits(&self, _key: &Key, idxs: &[u32], _size: u8, _increments: &[i64]) -> BackendResult<Vec<u64>> {
            Ok(vec![0; idxs.len()])
        }
        async fn slice_incr(&self, _key: &Key, _start: i64, _end: i64, _max_value: u64, _expire: Duration) -> BackendResult<u64> {
            Ok(0)
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
        async fn set_lock(&self, key: &Key, owner: &Raw, expire: Duration) -> BackendResult<bool> {
            self.set(key, owner.clone(), Some(expire), SetCondition::IfAbsent).await
        }
        async fn unlock(&self, key: &Key, _owner: &Raw) -> BackendResult<bool> {
            Ok(self.store.remove(key).is_some())
        }
        async fn get_size(&self, _key: &Key) -> BackendResult<i64> {
            Ok(-1)
        }
        async fn ping(&self, message: Option<Raw>) -> BackendResult<Raw> {
            Ok(message.unwrap_or_else(|| Raw::from_static(b"pong")))
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
    async fn disabled_get_returns_none_without_touching_backend() {
        let backend = Guarded::new(DummyBackend::default());
        backend.set(&key("a"), Raw::from_static(b"v"), None, SetCondition::Always).await.unwrap();

        disabling(&[Command::Get], async {
            assert_eq!(backend.get(&key("a")).await.unwrap(), None);
        })
        .await;

        assert_eq!(backend.get(&key("a")).await.unwrap(), Some(Raw::from_static(b"v")));
    }

    #[tokio::test]
    async fn invalidate_further_deletes_instead_of_serving() {
        let backend = Guarded::new(DummyBackend::default());
        backend.set(&key("a"), Raw::from_static(b"v"), None, SetCondition::Always).await.unwrap();

        context::invalidate_further(async {
            assert_eq!(backend.get(&key("a")).await.unwrap(), None);
        })
        .await;

        assert_eq!(backend.get(&key("a")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn auto_init_runs_exactly_once() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = calls.clone();
        let backend = AutoInit::new(DummyBackend::default(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        });

        backend.get(&key("a")).await.unwrap();
        backend.get(&key("b")).await.unwrap();

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
