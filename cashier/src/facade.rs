//! Prefix-routed cache facade.
//!
//! A [`Facade`] holds a table of `(prefix, backend)` routes. Every command
//! is dispatched to the backend registered under the longest prefix of the
//! key it's routed by, falling back to a default backend if one was
//! configured. Each registered backend is wrapped, once at registration
//! time, with [`middleware::Guarded`] (disable-control, invalidate-further)
//! and any user [`Middleware`](middleware::Middleware)s, innermost-first —
//! see [`crate::middleware`] for why this is a wrapper chain rather than a
//! re-folded closure per call.
//!
//! Multi-key commands (`get_many`, `set_many`, `delete_many`) may span
//! several backends at once: each key is routed independently, the calls
//! fan out per backend, and results are reassembled in the caller's
//! original key order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cashier_backend::{Backend, DeleteStatus, Expiry, SetCondition, SyncBackend};
use cashier_core::{Key, Raw};
use smol_str::SmolStr;

use crate::error::CacheError;
use crate::middleware::{AutoInit, Guarded, Middleware};

struct Route {
    prefix: SmolStr,
    backend: Arc<SyncBackend>,
}

/// Builds a [`Facade`] by registering backends under key prefixes.
pub struct FacadeBuilder {
    routes: Vec<(SmolStr, Arc<SyncBackend>)>,
    default: Option<Arc<SyncBackend>>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl FacadeBuilder {
    /// Starts an empty builder.
    pub fn new() -> Self {
        Self { routes: Vec::new(), default: None, middlewares: Vec::new() }
    }

    /// Registers `backend` to handle every key starting with `prefix`.
    pub fn register(mut self, prefix: impl Into<SmolStr>, backend: impl Backend + 'static) -> Self {
        self.routes.push((prefix.into(), Arc::new(backend) as Arc<SyncBackend>));
        self
    }

    /// Registers `backend`, running `init` once before its first call.
    pub fn register_with_init<B, F, Fut>(mut self, prefix: impl Into<SmolStr>, backend: B, init: F) -> Self
    where
        B: Backend + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let wrapped = AutoInit::new(backend, init);
        self.routes.push((prefix.into(), Arc::new(wrapped) as Arc<SyncBackend>));
        self
    }

    /// Registers `backend` to handle any key matching no registered prefix.
    pub fn default_backend(mut self, backend: impl Backend + 'static) -> Self {
        self.default = Some(Arc::new(backend) as Arc<SyncBackend>);
        self
    }

    /// Adds a user middleware, applied outside disable-control and
    /// invalidate-further, in the order added (first added is outermost).
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Finishes building the facade.
    ///
    /// Each registered backend is wrapped with [`Guarded`] innermost, then
    /// every user middleware in registration order, outermost last-added.
    pub fn build(self) -> Facade {
        let wrap = |backend: Arc<SyncBackend>| -> Arc<SyncBackend> {
            let guarded: Arc<SyncBackend> = Arc::new(Guarded::new(backend));
            self.middlewares.iter().fold(guarded, |acc, mw| mw.wrap(acc))
        };

        let mut routes: Vec<Route> = self
            .routes
            .into_iter()
            .map(|(prefix, backend)| Route { prefix, backend: wrap(backend) })
            .collect();
        // Longest prefix first so the first match found is the most specific.
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        Facade {
            inner: Arc::new(FacadeInner { routes, default: self.default.map(wrap) }),
        }
    }
}

impl Default for FacadeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct FacadeInner {
    routes: Vec<Route>,
    default: Option<Arc<SyncBackend>>,
}

/// Prefix-routed entry point to the configured backends.
#[derive(Clone)]
pub struct Facade {
    inner: Arc<FacadeInner>,
}

impl Facade {
    /// Starts a [`FacadeBuilder`].
    pub fn builder() -> FacadeBuilder {
        FacadeBuilder::new()
    }

    fn route(&self, key: &Key) -> Result<&Arc<SyncBackend>, CacheError> {
        if self.inner.routes.is_empty() && self.inner.default.is_none() {
            return Err(CacheError::NotConfigured);
        }
        self.inner
            .routes
            .iter()
            .find(|route| key.as_str().starts_with(route.prefix.as_str()))
            .map(|route| &route.backend)
            .or(self.inner.default.as_ref())
            .ok_or_else(|| CacheError::NoBackendForKey(key.as_str().to_string()))
    }

    /// Stores `value` under `key`, respecting `condition`.
    pub async fn set(&self, key: &Key, value: Raw, expire: Option<Duration>, condition: SetCondition) -> Result<bool, CacheError> {
        Ok(self.route(key)?.set(key, value, expire, condition).await?)
    }

    /// Reads the value stored at `key`.
    pub async fn get(&self, key: &Key) -> Result<Option<Raw>, CacheError> {
        Ok(self.route(key)?.get(key).await?)
    }

    /// Removes `key`.
    pub async fn delete(&self, key: &Key) -> Result<DeleteStatus, CacheError> {
        Ok(self.route(key)?.delete(key).await?)
    }

    /// Existence test.
    pub async fn exists(&self, key: &Key) -> Result<bool, CacheError> {
        Ok(self.route(key)?.exists(key).await?)
    }

    /// Atomically increments the integer at `key`.
    pub async fn incr(&self, key: &Key, amount: i64, expire: Option<Duration>) -> Result<i64, CacheError> {
        Ok(self.route(key)?.incr(key, amount, expire).await?)
    }

    /// Reads `key`'s remaining TTL.
    pub async fn get_expire(&self, key: &Key) -> Result<Expiry, CacheError> {
        Ok(self.route(key)?.get_expire(key).await?)
    }

    /// Fans `keys` out to their owning backends and reassembles the results
    /// in the caller's original order.
    pub async fn get_many(&self, keys: &[Key]) -> Result<Vec<Option<Raw>>, CacheError> {
        let groups = self.group_by_backend(keys)?;
        let mut out: Vec<Option<Raw>> = vec![None; keys.len()];
        for (backend, indices) in groups {
            let group_keys: Vec<Key> = indices.iter().map(|&i| keys[i].clone()).collect();
            let values = backend.get_many(&group_keys).await?;
            for (slot, value) in indices.into_iter().zip(values) {
                out[slot] = value;
            }
        }
        Ok(out)
    }

    /// Fans `pairs` out to their owning backends, one common `expire` for all.
    pub async fn set_many(&self, pairs: &[(Key, Raw)], expire: Option<Duration>) -> Result<(), CacheError> {
        let keys: Vec<Key> = pairs.iter().map(|(k, _)| k.clone()).collect();
        let groups = self.group_by_backend(&keys)?;
        for (backend, indices) in groups {
            let group_pairs: Vec<(Key, Raw)> = indices.iter().map(|&i| pairs[i].clone()).collect();
            backend.set_many(&group_pairs, expire).await?;
        }
        Ok(())
    }

    /// Fans `keys` out to their owning backends, summing deletions.
    pub async fn delete_many(&self, keys: &[Key]) -> Result<DeleteStatus, CacheError> {
        let groups = self.group_by_backend(keys)?;
        let mut total = 0u32;
        for (backend, indices) in groups {
            let group_keys: Vec<Key> = indices.iter().map(|&i| keys[i].clone()).collect();
            if let DeleteStatus::Deleted(n) = backend.delete_many(&group_keys).await? {
                total += n;
            }
        }
        Ok(if total > 0 { DeleteStatus::Deleted(total) } else { DeleteStatus::Missing })
    }

    fn group_by_backend(&self, keys: &[Key]) -> Result<Vec<(Arc<SyncBackend>, Vec<usize>)>, CacheError> {
        let mut order: Vec<usize> = Vec::new();
        let mut by_backend: HashMap<usize, (Arc<SyncBackend>, Vec<usize>)> = HashMap::new();
        for (i, key) in keys.iter().enumerate() {
            let backend = self.route(key)?.clone();
            let ptr = Arc::as_ptr(&backend) as *const () as usize;
            by_backend
                .entry(ptr)
                .or_insert_with(|| {
                    order.push(ptr);
                    (backend, Vec::new())
                })
                .1
                .push(i);
        }
        Ok(order.into_iter().map(|ptr| by_backend.remove(&ptr).unwrap()).collect())
    }

    /// Direct access to the backend routed for `key`, for callers (decorators)
    /// that need the full backend surface rather than the facade's subset.
    pub fn backend_for(&self, key: &Key) -> Result<Arc<SyncBackend>, CacheError> {
        self.route(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;

    #[derive(Clone, Default)]
    struct MapBackend {
        label: &'static str,
        store: Arc<DashMap<Key, Raw>>,
    }

    #[async_trait::async_trait]
    impl Backend for MapBackend {
        fn label(&self) -> cashier_core::BackendLabel {
            cashier_core::BackendLabel::new_static(self.label)
        }
        async fn set(&self, key: &Key, value: Raw, _expire: Option<Duration>, _condition: SetCondition) -> cashier_backend::BackendResult<bool> {
            self.store.insert(key.clone(), value);
            Ok(true)
        }
        async fn get(&self, key: &Key) -> cashier_backend::BackendResult<Option<Raw>> {
            Ok(self.store.get(key).map(|v| v.clone()))
        }
        async fn get_match(&self, _pattern: &str) -> cashier_backend::BackendResult<Vec<(Key, Raw)>> {
            Ok(Vec::new())
        }
        async fn scan(&self, _pattern: &str) -> cashier_backend::BackendResult<Vec<Key>> {
            Ok(Vec::new())
        }
        async fn incr(&self, _key: &Key, amount: i64, _expire: Option<Duration>) -> cashier_backend::BackendResult<i64> {
            Ok(amount)
        }
        async fn delete(&self, key: &Key) -> cashier_backend::BackendResult<DeleteStatus> {
            Ok(if self.store.remove(key).is_some() { DeleteStatus::Deleted(1) } else { DeleteStatus::Missing })
        }
        async fn expire(&self, _key: &Key, _ttl: Duration) -> cashier_backend::BackendResult<bool> {
            Ok(true)
        }
        async fn get_expire(&self, _key: &Key) -> cashier_backend::BackendResult<Expiry> {
            Ok(Expiry::Unlimited)
        }
        async fn get_bits(&self, _key: &Key, idxs: &[u32], _size: u8) -> cashier_backend::BackendResult<Vec<u64>> {
            Ok(vec![0; idxs.len()])
        }
        async fn incr_bits(&self, _key: &Key, idxs: &[u32], _size: u8, _increments: &[i64]) -> cashier_backend::BackendResult<Vec<u64>> {
            Ok(vec![0; idxs.len()])
        }
        async fn slice_incr(&self, _key: &Key, _start: i64, _end: i64, _max_value: u64, _expire: Duration) -> cashier_backend::BackendResult<u64> {
            Ok(0)
        }
        async fn set_add(&self, _key: &Key, _members: &[Raw]) -> cashier_backend::BackendResult<()> {
            Ok(())
        }
        async fn set_remove(&self, _key: &Key, _members: &[Raw]) -> cashier_backend::BackendResult<()> {
            Ok(())
        }
        async fn set_pop(&self, _key: &Key, _count: usize) -> cashier_backend::BackendResult<Vec<Raw>> {
            Ok(Vec::new())
        }
        async fn set_lock(&self, key: &Key, owner: &Raw, expire: Duration) -> cashier_backend::BackendResult<bool> {
            self.set(key, owner.clone(), Some(expire), SetCondition::IfAbsent).await
        }
        async fn unlock(&self, key: &Key, _owner: &Raw) -> cashier_backend::BackendResult<bool> {
            Ok(self.store.remove(key).is_some())
        }
        async fn get_size(&self, _key: &Key) -> cashier_backend::BackendResult<i64> {
            Ok(-1)
        }
        async fn ping(&self, message: Option<Raw>) -> cashier_backend::BackendResult<Raw> {
            Ok(message.unwrap_or_else(|| Raw::from_static(b"pong")))
        }
        async fn clear(&self) -> cashier_backend::BackendResult<()> {
            self.store.clear();
            Ok(())
        }
        fn on_remove_callback(&self, _callback: Arc<dyn cashier_backend::RemoveCallback>) {}
    }

    #[tokio::test]
    async fn routes_to_longest_matching_prefix() {
        let facade = Facade::builder()
            .register("user:", MapBackend { label: "users", ..Default::default() })
            .register("user:session:", MapBackend { label: "sessions", ..Default::default() })
            .build();

        facade.set(&Key::new("user:session:42"), Raw::from_static(b"v"), None, SetCondition::Always).await.unwrap();
        let backend = facade.backend_for(&Key::new("user:session:42")).unwrap();
        assert_eq!(backend.label().as_str(), "sessions");

        let other = facade.backend_for(&Key::new("user:42")).unwrap();
        assert_eq!(other.label().as_str(), "users");
    }

    #[tokio::test]
    async fn falls_back_to_default_backend() {
        let facade = Facade::builder()
            .register("user:", MapBackend { label: "users", ..Default::default() })
            .default_backend(MapBackend { label: "fallback", ..Default::default() })
            .build();

        let backend = facade.backend_for(&Key::new("unrelated")).unwrap();
        assert_eq!(backend.label().as_str(), "fallback");
    }

    #[tokio::test]
    async fn unconfigured_facade_errors() {
        let facade = Facade::builder().build();
        let err = facade.get(&Key::new("anything")).await.unwrap_err();
        assert!(matches!(err, CacheError::NotConfigured));
    }

    #[tokio::test]
    async fn get_many_fans_out_and_reassembles_in_order() {
        let facade = Facade::builder()
            .register("a:", MapBackend { label: "a", ..Default::default() })
            .register("b:", MapBackend { label: "b", ..Default::default() })
            .build();

        facade.set(&Key::new("a:1"), Raw::from_static(b"va1"), None, SetCondition::Always).await.unwrap();
        facade.set(&Key::new("b:1"), Raw::from_static(b"vb1"), None, SetCondition::Always).await.unwrap();

        let results = facade
            .get_many(&[Key::new("a:1"), Key::new("b:1"), Key::new("a:missing")])
            .await
            .unwrap();

        assert_eq!(results[0], Some(Raw::from_static(b"va1")));
        assert_eq!(results[1], Some(Raw::from_static(b"vb1")));
        assert_eq!(results[2], None);
    }
}
