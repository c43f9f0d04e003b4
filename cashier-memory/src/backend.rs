//! In-memory backend: LRU-ish, TTL-aware, with a background expiry sweep.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cashier_backend::{Backend, BackendResult, DeleteStatus, Expiry, RemoveCallback, SetCondition};
use cashier_core::{BackendLabel, Key, Raw};
use dashmap::DashMap;
use parking_lot::Mutex;
use regex::Regex;

struct Entry {
    value: Raw,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory cache backend, bounded by entry count with FIFO-ish eviction.
///
/// Expiry is checked lazily on read, plus a periodic background sweep (see
/// [`MemoryBackend::spawn_sweeper`]) that evicts stale entries proactively
/// rather than waiting for the next read.
///
/// Capacity eviction is by insertion order rather than access order: tracking
/// true least-recently-used order would need a global lock on every read,
/// which would defeat the point of using a concurrent map for storage.
///
/// Cheap to clone: every field is an `Arc` or `Copy` type, so a clone shares
/// the same underlying store rather than duplicating it — needed wherever a
/// backend has to be moved into a spawned task (the sweeper) or wrapped by
/// another backend that holds its own copy (e.g. a client-side hybrid's
/// local mirror).
#[derive(Clone)]
pub struct MemoryBackend {
    label: BackendLabel,
    max_entries: usize,
    store: Arc<DashMap<Key, Entry>>,
    sets: Arc<DashMap<Key, HashSet<Raw>>>,
    slices: Arc<DashMap<Key, (Vec<i64>, Option<Instant>)>>,
    insertion_order: Arc<Mutex<VecDeque<Key>>>,
    remove_callback: Arc<Mutex<Option<Arc<dyn RemoveCallback>>>>,
}

impl MemoryBackend {
    /// Starts a [`crate::builder::MemoryBackendBuilder`] with default settings.
    pub fn builder() -> crate::builder::MemoryBackendBuilder {
        crate::builder::MemoryBackendBuilder::new()
    }

    pub(crate) fn new(label: BackendLabel, max_entries: usize) -> Self {
        Self {
            label,
            max_entries,
            store: Arc::new(DashMap::new()),
            sets: Arc::new(DashMap::new()),
            slices: Arc::new(DashMap::new()),
            insertion_order: Arc::new(Mutex::new(VecDeque::new())),
            remove_callback: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawns a background task that sweeps expired entries every `interval`.
    ///
    /// The task holds only cheap `Arc` clones of the backend's storage, so
    /// it does not keep the whole backend alive if every handle is dropped;
    /// it simply stops finding work and is eventually cancelled with the runtime.
    pub fn spawn_sweeper(&self, interval: Duration) {
        let store = self.store.clone();
        let remove_callback = self.remove_callback.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let expired: Vec<Key> = store
                    .iter()
                    .filter(|entry| entry.value().is_expired())
                    .map(|entry| entry.key().clone())
                    .collect();
                if expired.is_empty() {
                    continue;
                }
                for key in &expired {
                    store.remove(key);
                }
                if let Some(callback) = remove_callback.lock().as_ref() {
                    callback.on_remove(&expired);
                }
            }
        });
    }

    fn report_capacity(&self) {
        crate::metrics::record_capacity(self.label.as_str(), self.store.len() as u64);
    }

    fn evict_if_over_capacity(&self) {
        if self.max_entries == 0 {
            return;
        }
        let mut order = self.insertion_order.lock();
        while self.store.len() > self.max_entries {
            match order.pop_front() {
                Some(key) => {
                    self.store.remove(&key);
                }
                None => break,
            }
        }
    }

    fn touch(&self, key: &Key) {
        self.insertion_order.lock().push_back(key.clone());
    }

    fn notify_removed(&self, keys: &[Key]) {
        if keys.is_empty() {
            return;
        }
        if let Some(callback) = self.remove_callback.lock().as_ref() {
            callback.on_remove(keys);
        }
    }

    fn glob_to_regex(pattern: &str) -> Regex {
        let escaped = regex::escape(pattern).replace(r"\*", ".*").replace(r"\?", ".");
        Regex::new(&format!("^{escaped}$")).expect("glob pattern compiles to a valid regex")
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn label(&self) -> BackendLabel {
        self.label.clone()
    }

    async fn set(&self, key: &Key, value: Raw, expire: Option<Duration>, condition: SetCondition) -> BackendResult<bool> {
        let exists = self.store.get(key).is_some_and(|e| !e.is_expired());
        let should_store = match condition {
            SetCondition::Always => true,
            SetCondition::IfExists => exists,
            SetCondition::IfAbsent => !exists,
        };
        if !should_store {
            return Ok(false);
        }
        let expires_at = expire.map(|d| Instant::now() + d);
        self.store.insert(key.clone(), Entry { value, expires_at });
        if !exists {
            self.touch(key);
        }
        self.evict_if_over_capacity();
        self.report_capacity();
        Ok(true)
    }

    async fn get(&self, key: &Key) -> BackendResult<Option<Raw>> {
        let Some(entry) = self.store.get(key) else {
            return Ok(None);
        };
        if entry.is_expired() {
            drop(entry);
            self.store.remove(key);
            self.notify_removed(std::slice::from_ref(key));
            return Ok(None);
        }
        Ok(Some(entry.value.clone()))
    }

    async fn get_match(&self, pattern: &str) -> BackendResult<Vec<(Key, Raw)>> {
        let regex = Self::glob_to_regex(pattern);
        let mut matched = Vec::new();
        let mut expired = Vec::new();
        for entry in self.store.iter() {
            if !regex.is_match(entry.key().as_str()) {
                continue;
            }
            if entry.value().is_expired() {
                expired.push(entry.key().clone());
            } else {
                matched.push((entry.key().clone(), entry.value().value.clone()));
            }
        }
        for key in &expired {
            self.store.remove(key);
        }
        self.notify_removed(&expired);
        Ok(matched)
    }

    async fn scan(&self, pattern: &str) -> BackendResult<Vec<Key>> {
        Ok(self.get_match(pattern).await?.into_iter().map(|(k, _)| k).collect())
    }

    async fn incr(&self, key: &Key, amount: i64, expire: Option<Duration>) -> BackendResult<i64> {
        let current = match self.get(key).await? {
            Some(raw) if raw.len() == 8 => i64::from_le_bytes(raw[..8].try_into().unwrap()),
            _ => 0,
        };
        let next = current + amount;
        let keep_expire = if expire.is_some() {
            expire
        } else {
            self.store.get(key).and_then(|e| e.expires_at.map(|at| at.saturating_duration_since(Instant::now())))
        };
        self.set(key, Raw::copy_from_slice(&next.to_le_bytes()), keep_expire, SetCondition::Always)
            .await?;
        Ok(next)
    }

    async fn delete(&self, key: &Key) -> BackendResult<DeleteStatus> {
        let removed = self.store.remove(key).is_some();
        self.sets.remove(key);
        self.slices.remove(key);
        if removed {
            self.notify_removed(std::slice::from_ref(key));
            Ok(DeleteStatus::Deleted(1))
        } else {
            Ok(DeleteStatus::Missing)
        }
    }

    async fn expire(&self, key: &Key, ttl: Duration) -> BackendResult<bool> {
        let Some(mut entry) = self.store.get_mut(key) else {
            return Ok(false);
        };
        if entry.is_expired() {
            return Ok(false);
        }
        entry.expires_at = Some(Instant::now() + ttl);
        Ok(true)
    }

    async fn get_expire(&self, key: &Key) -> BackendResult<Expiry> {
        let Some(entry) = self.store.get(key) else {
            return Ok(Expiry::NotFound);
        };
        if entry.is_expired() {
            return Ok(Expiry::NotFound);
        }
        Ok(match entry.expires_at {
            None => Expiry::Unlimited,
            Some(at) => Expiry::In(at.saturating_duration_since(Instant::now())),
        })
    }

    async fn get_bits(&self, key: &Key, idxs: &[u32], size: u8) -> BackendResult<Vec<u64>> {
        let bytes = self.get(key).await?.unwrap_or_default();
        Ok(idxs.iter().map(|&idx| read_bitfield(&bytes, idx, size)).collect())
    }

    async fn incr_bits(&self, key: &Key, idxs: &[u32], size: u8, increments: &[i64]) -> BackendResult<Vec<u64>> {
        let mut bytes = self.get(key).await?.map(|b| b.to_vec()).unwrap_or_default();
        let max = if size >= 64 { u64::MAX } else { (1u64 << size) - 1 };
        let mut results = Vec::with_capacity(idxs.len());
        for (&idx, &increment) in idxs.iter().zip(increments) {
            let current = read_bitfield(&bytes, idx, size);
            let updated = current.saturating_add_signed(increment).min(max);
            write_bitfield(&mut bytes, idx, size, updated);
            results.push(updated);
        }
        self.set(key, Raw::from(bytes), None, SetCondition::Always).await?;
        Ok(results)
    }

    async fn slice_incr(&self, key: &Key, start: i64, end: i64, max_value: u64, expire: Duration) -> BackendResult<u64> {
        let mut slot = self.slices.entry(key.clone()).or_insert_with(|| (Vec::new(), None));
        let (scores, expires_at) = &mut *slot;
        if expires_at.is_some_and(|at| Instant::now() >= at) {
            scores.clear();
        }
        scores.retain(|&score| score >= start);
        let in_window = scores.iter().filter(|&&score| score <= end).count() as u64;
        if in_window < max_value {
            scores.push(end);
            *expires_at = Some(Instant::now() + expire);
        }
        Ok(scores.iter().filter(|&&score| score <= end).count() as u64)
    }

    async fn set_add(&self, key: &Key, members: &[Raw]) -> BackendResult<()> {
        let mut set = self.sets.entry(key.clone()).or_default();
        set.extend(members.iter().cloned());
        Ok(())
    }

    async fn set_remove(&self, key: &Key, members: &[Raw]) -> BackendResult<()> {
        if let Some(mut set) = self.sets.get_mut(key) {
            for member in members {
                set.remove(member);
            }
        }
        Ok(())
    }

    async fn set_pop(&self, key: &Key, count: usize) -> BackendResult<Vec<Raw>> {
        let Some(mut set) = self.sets.get_mut(key) else {
            return Ok(Vec::new());
        };
        let popped: Vec<Raw> = set.iter().take(count).cloned().collect();
        for member in &popped {
            set.remove(member);
        }
        Ok(popped)
    }

    async fn set_lock(&self, key: &Key, owner: &Raw, expire: Duration) -> BackendResult<bool> {
        self.set(key, owner.clone(), Some(expire), SetCondition::IfAbsent).await
    }

    async fn unlock(&self, key: &Key, owner: &Raw) -> BackendResult<bool> {
        let matches = self.store.get(key).is_some_and(|e| !e.is_expired() && e.value == *owner);
        if matches {
            self.store.remove(key);
            self.notify_removed(std::slice::from_ref(key));
        }
        Ok(matches)
    }

    async fn get_size(&self, key: &Key) -> BackendResult<i64> {
        Ok(self.store.get(key).map(|e| e.value.len() as i64).unwrap_or(-1))
    }

    async fn ping(&self, message: Option<Raw>) -> BackendResult<Raw> {
        Ok(match message {
            None => Raw::from_static(b"PONG"),
            Some(m) if m.as_ref() == b"PING" => Raw::from_static(b"PONG"),
            Some(m) => m,
        })
    }

    async fn clear(&self) -> BackendResult<()> {
        self.store.clear();
        self.sets.clear();
        self.slices.clear();
        self.insertion_order.lock().clear();
        Ok(())
    }

    fn on_remove_callback(&self, callback: Arc<dyn RemoveCallback>) {
        *self.remove_callback.lock() = Some(callback);
    }
}

fn read_bitfield(bytes: &[u8], idx: u32, size: u8) -> u64 {
    let bit_offset = idx as u64 * size as u64;
    let mut value: u64 = 0;
    for bit in 0..size as u64 {
        let pos = bit_offset + bit;
        let byte_idx = (pos / 8) as usize;
        let bit_idx = 7 - (pos % 8);
        let bit_set = bytes.get(byte_idx).is_some_and(|b| (b >> bit_idx) & 1 == 1);
        value = (value << 1) | bit_set as u64;
    }
    value
}

fn write_bitfield(bytes: &mut Vec<u8>, idx: u32, size: u8, value: u64) {
    let bit_offset = idx as u64 * size as u64;
    let needed_bytes = (bit_offset as usize + size as usize).div_ceil(8);
    if bytes.len() < needed_bytes {
        bytes.resize(needed_bytes, 0);
    }
    for bit in 0..size as u64 {
        let pos = bit_offset + bit;
        let byte_idx = (pos / 8) as usize;
        let bit_idx = 7 - (pos % 8);
        let bit_value = (value >> (size as u64 - 1 - bit)) & 1;
        if bit_value == 1 {
            bytes[byte_idx] |= 1 << bit_idx;
        } else {
            bytes[byte_idx] &= !(1 << bit_idx);
        }
    }
}
