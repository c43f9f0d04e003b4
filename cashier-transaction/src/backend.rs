//! The transactional overlay backend: write-buffer + tombstone set layered
//! over a target backend, in one of three isolation modes.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cashier_backend::{Backend, BackendError, BackendResult, DeleteStatus, Expiry, RemoveCallback, SetCondition, SyncBackend};
use cashier_core::{BackendLabel, Key, Raw};
use parking_lot::Mutex;
use regex::Regex;
use uuid::Uuid;

tokio::task_local! {
    static CURRENT_TX: Arc<Mutex<TxState>>;
}

/// A lock held against a type-erased target, released by dropping it.
///
/// Mirrors [`cashier_backend::LockGuard`]'s shape without its generic
/// parameter, so it can live inside [`TxState`] — which must itself stay
/// non-generic, since a `tokio::task_local!` can't close over
/// [`TransactionBackend`]'s `B`. Keeping locks behind this guard (instead of
/// bare `Key`s released only by explicit `.await` calls in `commit`/
/// `rollback`) means a transaction cancelled mid-flight — a dropped
/// `JoinHandle`, a losing `tokio::select!` branch — still releases every
/// lock it acquired, via the same detached best-effort unlock on `Drop`.
struct TxLockGuard {
    backend: Arc<SyncBackend>,
    key: Key,
    owner: Raw,
    released: bool,
}

impl TxLockGuard {
    /// Releases the lock now, returning whether it was actually held.
    async fn release(mut self) -> BackendResult<bool> {
        self.released = true;
        self.backend.unlock(&self.key, &self.owner).await
    }
}

impl Drop for TxLockGuard {
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

/// Isolation level a [`TransactionBackend`] enforces between concurrent
/// transactions against the same target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Local write-buffer and tombstone set, no locking. Concurrent
    /// transactions can both commit; the last write wins per key.
    Fast,
    /// Like [`Mode::Fast`], but the first mutation to each key within a
    /// transaction acquires a per-key lock on the target, held until
    /// commit or rollback.
    Locked,
    /// Like [`Mode::Locked`], but a single global lock key is used instead
    /// of one per mutated key, so at most one transaction mutates the
    /// target at a time.
    Serializable,
}

struct TxState {
    writes: HashMap<Key, (Raw, Option<Duration>)>,
    tombstones: HashSet<Key>,
    locked_guards: Vec<TxLockGuard>,
    owner: Raw,
}

fn tx_lock_key(key: &Key) -> Key {
    Key::new(format!(":tx_lock:{}", key.as_str()))
}

fn global_lock_key() -> Key {
    Key::new(":tx_lock:__global__")
}

fn glob_to_regex(pattern: &str) -> Regex {
    let escaped = regex::escape(pattern).replace(r"\*", ".*").replace(r"\?", ".");
    Regex::new(&format!("^{escaped}$")).expect("glob pattern compiles to a valid regex")
}

/// Wraps a target backend `B` with transactional semantics: reads inside a
/// transaction see the union of its own write-buffer (tombstones masking
/// deleted keys) and the target; writes stay local until commit, which
/// flushes them grouped by TTL and deletes every tombstoned key.
///
/// Nested calls to [`TransactionBackend::transaction`] from the same async
/// task join the outer transaction instead of starting a new one: they
/// share its write-buffer and lock set, and only the outermost call commits
/// or rolls back.
pub struct TransactionBackend<B> {
    label: BackendLabel,
    target: B,
    target_dyn: Arc<SyncBackend>,
    mode: Mode,
    lock_ttl: Duration,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl<B: Backend + Clone + 'static> TransactionBackend<B> {
    /// Starts a [`crate::builder::TransactionBackendBuilder`] with default settings.
    pub fn builder(target: B) -> crate::builder::TransactionBackendBuilder<B> {
        crate::builder::TransactionBackendBuilder::new(target)
    }

    pub(crate) fn new(label: BackendLabel, target: B, mode: Mode, lock_ttl: Duration, retry_attempts: u32, retry_delay: Duration) -> Self {
        let target_dyn: Arc<SyncBackend> = Arc::new(target.clone());
        Self { label, target, target_dyn, mode, lock_ttl, retry_attempts, retry_delay }
    }

    /// Runs `body` as a transaction. If `body` resolves to `Ok`, the
    /// write-buffer is flushed and tombstones deleted; on `Err`, both are
    /// discarded. Either way, every lock the transaction acquired is
    /// released before returning.
    ///
    /// If called while already inside a transaction on this task, `body`
    /// just runs against the existing write-buffer; commit and lock release
    /// only happen at the outermost call.
    pub async fn transaction<F, Fut, T>(&self, body: F) -> BackendResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        if CURRENT_TX.try_with(|_| ()).is_ok() {
            return body().await;
        }

        let owner = Raw::copy_from_slice(Uuid::new_v4().as_bytes());
        let global_guard = if matches!(self.mode, Mode::Serializable) {
            Some(self.acquire_guard_with_retry(&global_lock_key(), &owner).await?)
        } else {
            None
        };

        let state = Arc::new(Mutex::new(TxState {
            writes: HashMap::new(),
            tombstones: HashSet::new(),
            locked_guards: Vec::new(),
            owner: owner.clone(),
        }));

        let result = CURRENT_TX.scope(state.clone(), body()).await;

        let flush = match &result {
            Ok(_) => self.commit(&state).await,
            Err(_) => {
                self.rollback(&state).await;
                Ok(())
            }
        };

        if let Some(guard) = global_guard {
            let _ = guard.release().await;
        }

        flush?;
        result
    }

    async fn ensure_key_lock(&self, state: &Arc<Mutex<TxState>>, key: &Key) -> BackendResult<()> {
        if !matches!(self.mode, Mode::Locked) {
            return Ok(());
        }
        let (already_held, owner) = {
            let s = state.lock();
            (s.locked_guards.iter().any(|g| &g.key == key), s.owner.clone())
        };
        if already_held {
            return Ok(());
        }
        let guard = self.acquire_guard_with_retry(&tx_lock_key(key), &owner).await?;
        state.lock().locked_guards.push(guard);
        Ok(())
    }

    async fn acquire_guard_with_retry(&self, lock_key: &Key, owner: &Raw) -> BackendResult<TxLockGuard> {
        for attempt in 0..=self.retry_attempts {
            if self.target_dyn.set_lock(lock_key, owner, self.lock_ttl).await? {
                return Ok(TxLockGuard {
                    backend: self.target_dyn.clone(),
                    key: lock_key.clone(),
                    owner: owner.clone(),
                    released: false,
                });
            }
            if attempt < self.retry_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
        Err(BackendError::Locked)
    }

    async fn commit(&self, state: &Arc<Mutex<TxState>>) -> BackendResult<()> {
        let (writes, tombstones, locked_guards) = {
            let mut s = state.lock();
            (s.writes.clone(), s.tombstones.clone(), std::mem::take(&mut s.locked_guards))
        };

        let mut by_ttl: HashMap<Option<Duration>, Vec<(Key, Raw)>> = HashMap::new();
        for (key, (value, ttl)) in writes {
            by_ttl.entry(ttl).or_default().push((key, value));
        }
        for (ttl, pairs) in by_ttl {
            self.target.set_many(&pairs, ttl).await?;
        }
        if !tombstones.is_empty() {
            let keys: Vec<Key> = tombstones.into_iter().collect();
            self.target.delete_many(&keys).await?;
        }

        Self::release_key_locks(locked_guards).await;
        Ok(())
    }

    async fn rollback(&self, state: &Arc<Mutex<TxState>>) {
        let locked_guards = std::mem::take(&mut state.lock().locked_guards);
        Self::release_key_locks(locked_guards).await;
    }

    async fn release_key_locks(guards: Vec<TxLockGuard>) {
        for guard in guards {
            let _ = guard.release().await;
        }
    }
}

#[async_trait]
impl<B: Backend + Clone + 'static> Backend for TransactionBackend<B> {
    fn label(&self) -> BackendLabel {
        self.label.clone()
    }

    async fn set(&self, key: &Key, value: Raw, expire: Option<Duration>, condition: SetCondition) -> BackendResult<bool> {
        if let Ok(state) = CURRENT_TX.try_with(|s| s.clone()) {
            self.ensure_key_lock(&state, key).await?;
            let mut s = state.lock();
            s.tombstones.remove(key);
            s.writes.insert(key.clone(), (value, expire));
            return Ok(true);
        }
        self.target.set(key, value, expire, condition).await
    }

    async fn get(&self, key: &Key) -> BackendResult<Option<Raw>> {
        if let Ok(state) = CURRENT_TX.try_with(|s| s.clone()) {
            let s = state.lock();
            if s.tombstones.contains(key) {
                return Ok(None);
            }
            if let Some((value, _)) = s.writes.get(key) {
                return Ok(Some(value.clone()));
            }
        }
        self.target.get(key).await
    }

    async fn get_match(&self, pattern: &str) -> BackendResult<Vec<(Key, Raw)>> {
        let mut results: HashMap<Key, Raw> = self.target.get_match(pattern).await?.into_iter().collect();
        if let Ok(state) = CURRENT_TX.try_with(|s| s.clone()) {
            let s = state.lock();
            for key in &s.tombstones {
                results.remove(key);
            }
            let regex = glob_to_regex(pattern);
            for (key, (value, _)) in s.writes.iter() {
                if regex.is_match(key.as_str()) {
                    results.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(results.into_iter().collect())
    }

    async fn scan(&self, pattern: &str) -> BackendResult<Vec<Key>> {
        Ok(self.get_match(pattern).await?.into_iter().map(|(key, _)| key).collect())
    }

    async fn incr(&self, key: &Key, amount: i64, expire: Option<Duration>) -> BackendResult<i64> {
        self.target.incr(key, amount, expire).await
    }

    async fn delete(&self, key: &Key) -> BackendResult<DeleteStatus> {
        if let Ok(state) = CURRENT_TX.try_with(|s| s.clone()) {
            self.ensure_key_lock(&state, key).await?;
            let mut s = state.lock();
            let had_local_write = s.writes.remove(key).is_some();
            let already_tombstoned = s.tombstones.contains(key);
            s.tombstones.insert(key.clone());
            return Ok(if had_local_write || !already_tombstoned {
                DeleteStatus::Deleted(1)
            } else {
                DeleteStatus::Missing
            });
        }
        self.target.delete(key).await
    }

    async fn expire(&self, key: &Key, ttl: Duration) -> BackendResult<bool> {
        self.target.expire(key, ttl).await
    }

    async fn get_expire(&self, key: &Key) -> BackendResult<Expiry> {
        self.target.get_expire(key).await
    }

    async fn get_bits(&self, key: &Key, idxs: &[u32], size: u8) -> BackendResult<Vec<u64>> {
        self.target.get_bits(key, idxs, size).await
    }

    async fn incr_bits(&self, key: &Key, idxs: &[u32], size: u8, increments: &[i64]) -> BackendResult<Vec<u64>> {
        self.target.incr_bits(key, idxs, size, increments).await
    }

    async fn slice_incr(&self, key: &Key, start: i64, end: i64, max_value: u64, expire: Duration) -> BackendResult<u64> {
        self.target.slice_incr(key, start, end, max_value, expire).await
    }

    async fn set_add(&self, key: &Key, members: &[Raw]) -> BackendResult<()> {
        self.target.set_add(key, members).await
    }

    async fn set_remove(&self, key: &Key, members: &[Raw]) -> BackendResult<()> {
        self.target.set_remove(key, members).await
    }

    async fn set_pop(&self, key: &Key, count: usize) -> BackendResult<Vec<Raw>> {
        self.target.set_pop(key, count).await
    }

    async fn set_lock(&self, key: &Key, owner: &Raw, expire: Duration) -> BackendResult<bool> {
        self.target.set_lock(key, owner, expire).await
    }

    async fn unlock(&self, key: &Key, owner: &Raw) -> BackendResult<bool> {
        self.target.unlock(key, owner).await
    }

    async fn get_size(&self, key: &Key) -> BackendResult<i64> {
        self.target.get_size(key).await
    }

    async fn ping(&self, message: Option<Raw>) -> BackendResult<Raw> {
        self.target.ping(message).await
    }

    async fn clear(&self) -> BackendResult<()> {
        self.target.clear().await
    }

    fn on_remove_callback(&self, callback: Arc<dyn RemoveCallback>) {
        self.target.on_remove_callback(callback)
    }
}

impl<B: Clone> Clone for TransactionBackend<B> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            target: self.target.clone(),
            target_dyn: self.target_dyn.clone(),
            mode: self.mode,
            lock_ttl: self.lock_ttl,
            retry_attempts: self.retry_attempts,
            retry_delay: self.retry_delay,
        }
    }
}
