//! Tag-based invalidation.
//!
//! Writers tag a key with one or more short names at write time; a reader
//! later calls [`TagRegistry::delete_tags`] to drop every key ever written
//! under a tag, without knowing the individual keys.
//!
//! A tag must be [`register`](TagRegistry::register)ed with at least one key
//! template pattern before anything can be tagged with it — this catches a
//! typo'd or copy-pasted tag name at write time instead of silently
//! invalidating nothing later. Membership is kept in a backend set stored
//! under `_tag:<name>`, populated with [`Backend::set_add`] and drained with
//! [`Backend::set_pop`].

use std::collections::HashMap;
use std::sync::Arc;

use cashier_backend::{Backend, DeleteStatus};
use cashier_core::{Key, KeyTemplate, Raw, TemplateError};
use dashmap::DashMap;
use smol_str::SmolStr;

use crate::error::CacheError;

/// How many set members [`TagRegistry::delete_tags`] pops per round trip.
const DELETE_BATCH: usize = 256;

/// A tag template allowed to carry bindings extracted from one key template.
struct TagEntry {
    tag_template: KeyTemplate,
    key_template: KeyTemplate,
}

/// Registry of tag templates to the key templates allowed to carry them.
///
/// A tag may itself carry placeholders (`"user:{uid}"`), in which case the
/// *bound* tag actually written to is that template rendered with the
/// bindings extracted from the concrete key's matching key template — e.g.
/// registering tag `"user:{uid}"` against key template `"get_items:{uid}"`
/// and tagging `"get_items:1"` writes to bound tag `"user:1"`, not the
/// literal string `"user:{uid}"`. A tag with no placeholders renders to
/// itself unchanged, so plain flat tag names work exactly as before.
#[derive(Default)]
pub struct TagRegistry {
    entries: DashMap<SmolStr, Vec<TagEntry>>,
}

impl TagRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows `tag` (a tag template) to be applied to any key matching
    /// `key_template` (the same placeholder syntax as
    /// [`KeyTemplate::compile`]), bound with that match's captures.
    ///
    /// Calling this more than once for the same tag template adds another
    /// allowed key template rather than replacing the existing ones.
    pub fn register(&self, tag: &str, key_template: &str) -> Result<(), TemplateError> {
        let tag_template = KeyTemplate::compile(tag)?;
        let key_template = KeyTemplate::compile(key_template)?;
        self.entries
            .entry(SmolStr::new(tag))
            .or_default()
            .push(TagEntry { tag_template, key_template });
        Ok(())
    }

    /// Resolves `tag_name` (a registered tag template string) against `key`,
    /// returning the bound tag if `key` matches one of the key templates
    /// registered for it.
    fn bind(&self, tag_name: &str, key: &Key) -> Option<Key> {
        let entries = self.entries.get(tag_name)?;
        entries.iter().find_map(|entry| {
            let bindings = extract_bindings(&entry.key_template, key)?;
            entry.tag_template.render(&bindings).ok()
        })
    }

    fn tag_set_key(tag: &str) -> Key {
        Key::new(format!("_tag:{tag}"))
    }

    /// Records that `key` carries `tags`, rejecting any tag `key` doesn't
    /// match a registered key template for.
    ///
    /// Called by the write path alongside (not instead of) the actual
    /// `set` — this only maintains the reverse index used by
    /// [`delete_tags`](Self::delete_tags).
    pub async fn tag(&self, backend: &dyn Backend, key: &Key, tags: &[&str]) -> Result<(), CacheError> {
        let mut bound = Vec::with_capacity(tags.len());
        for tag_name in tags {
            match self.bind(tag_name, key) {
                Some(b) => bound.push(b),
                None => return Err(CacheError::TagNotRegistered((*tag_name).to_string(), key.as_str().to_string())),
            }
        }
        for bound_tag in &bound {
            backend
                .set_add(&Self::tag_set_key(bound_tag.as_str()), &[Raw::copy_from_slice(key.as_str().as_bytes())])
                .await?;
        }
        Ok(())
    }

    /// Returns the bound tags `key` matches, regardless of whether it was
    /// ever actually tagged with them.
    pub fn get_key_tags(&self, key: &Key) -> Vec<Key> {
        let mut out = Vec::new();
        for entry in self.entries.iter() {
            for tag_entry in entry.value() {
                if let Some(bindings) = extract_bindings(&tag_entry.key_template, key) {
                    if let Ok(bound) = tag_entry.tag_template.render(&bindings) {
                        if !out.contains(&bound) {
                            out.push(bound);
                        }
                    }
                }
            }
        }
        out
    }

    /// Deletes every key ever tagged with any of `tags`, draining each
    /// tag's membership set in batches of [`DELETE_BATCH`] until empty, then
    /// removes the tag set itself. Returns the total number of keys deleted.
    pub async fn delete_tags(&self, backend: &dyn Backend, tags: &[&str]) -> Result<u64, CacheError> {
        let mut deleted = 0u64;
        for tag in tags {
            let tag_set = Self::tag_set_key(tag);
            loop {
                let members = backend.set_pop(&tag_set, DELETE_BATCH).await?;
                if members.is_empty() {
                    break;
                }
                let keys: Vec<Key> = members
                    .iter()
                    .map(|raw| Key::new(String::from_utf8_lossy(raw)))
                    .collect();
                if let DeleteStatus::Deleted(n) = backend.delete_many(&keys).await? {
                    deleted += u64::from(n);
                }
            }
            backend.delete(&tag_set).await?;
        }
        Ok(deleted)
    }
}

/// Extracts `key_template`'s named captures out of a concrete `key`, for
/// feeding into a tag template's [`KeyTemplate::render`].
fn extract_bindings<'a>(key_template: &KeyTemplate, key: &'a Key) -> Option<HashMap<&'a str, &'a str>> {
    let caps = key_template.pattern().captures(key.as_str())?;
    let mut bindings = HashMap::new();
    for name in key_template.pattern().capture_names().flatten() {
        if let Some(m) = caps.name(name) {
            bindings.insert(name, m.as_str());
        }
    }
    Some(bindings)
}

/// Prunes a tag's membership set when its keys are removed some other way
/// (eviction, expiry, a plain `delete` that bypassed [`TagRegistry::tag`]).
///
/// Registered with [`Backend::on_remove_callback`] so a backend's own
/// eviction sweep keeps tag sets honest without the facade polling them.
/// Pruning itself is spawned onto the backend's own set rather than done
/// inline, since [`cashier_backend::RemoveCallback::on_remove`] is sync.
pub struct TagPruner<B, O> {
    registry: Arc<TagRegistry>,
    backend: B,
    offload: O,
}

impl<B, O> TagPruner<B, O>
where
    B: Backend + Clone + 'static,
    O: cashier_core::Offload + 'static,
{
    /// Wraps `registry` and `backend` for use as a remove callback, spawning
    /// prune work through `offload`.
    pub fn new(registry: Arc<TagRegistry>, backend: B, offload: O) -> Self {
        Self { registry, backend, offload }
    }
}

impl<B, O> cashier_backend::RemoveCallback for TagPruner<B, O>
where
    B: Backend + Clone + 'static,
    O: cashier_core::Offload + 'static,
{
    fn on_remove(&self, keys: &[Key]) {
        let registry = self.registry.clone();
        let backend = self.backend.clone();
        let keys = keys.to_vec();
        self.offload.spawn("tag-prune", async move {
            for key in &keys {
                for tag in registry.get_key_tags(key) {
                    let member = Raw::copy_from_slice(key.as_str().as_bytes());
                    let _ = backend.set_remove(&TagRegistry::tag_set_key(tag.as_str()), &[member]).await;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashier_backend::SetCondition;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct SetBackend {
        sets: Arc<DashMap<Key, Vec<Raw>>>,
        values: Arc<DashMap<Key, Raw>>,
    }

    #[async_trait::async_trait]
    impl Backend for SetBackend {
        async fn set(&self, key: &Key, value: Raw, _expire: Option<Duration>, _condition: SetCondition) -> cashier_backend::BackendResult<bool> {
            self.values.insert(key.clone(), value);
            Ok(true)
        }
        async fn get(&self, key: &Key) -> cashier_backend::BackendResult<Option<Raw>> {
            Ok(self.values.get(key).map(|v| v.clone()))
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
            self.sets.remove(key);
            Ok(if self.values.remove(key).is_some() {
                DeleteStatus::Deleted(1)
            } else {
                DeleteStatus::Missing
            })
        }
        async fn delete_many(&self, keys: &[Key]) -> cashier_backend::BackendResult<DeleteStatus> {
            let mut removed = 0;
            for key in keys {
                if let DeleteStatus::Deleted(n) = self.delete(key).await? {
                    removed += n;
                }
            }
            Ok(if removed > 0 { DeleteStatus::Deleted(removed) } else { DeleteStatus::Missing })
        }
        async fn expire(&self, _key: &Key, _ttl: Duration) -> cashier_backend::BackendResult<bool> {
            Ok(true)
        }
        async fn get_expire(&self, _key: &Key) -> cashier_backend::BackendResult<cashier_backend::Expiry> {
            Ok(cashier_backend::Expiry::Unlimited)
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
        async fn set_add(&self, key: &Key, members: &[Raw]) -> cashier_backend::BackendResult<()> {
            self.sets.entry(key.clone()).or_default().extend_from_slice(members);
            Ok(())
        }
        async fn set_remove(&self, key: &Key, members: &[Raw]) -> cashier_backend::BackendResult<()> {
            if let Some(mut set) = self.sets.get_mut(key) {
                set.retain(|m| !members.contains(m));
            }
            Ok(())
        }
        async fn set_pop(&self, key: &Key, count: usize) -> cashier_backend::BackendResult<Vec<Raw>> {
            let mut set = self.sets.entry(key.clone()).or_default();
            let take = count.min(set.len());
            Ok(set.drain(..take).collect())
        }
        async fn set_lock(&self, key: &Key, owner: &Raw, expire: Duration) -> cashier_backend::BackendResult<bool> {
            self.set(key, owner.clone(), Some(expire), SetCondition::IfAbsent).await
        }
        async fn unlock(&self, key: &Key, _owner: &Raw) -> cashier_backend::BackendResult<bool> {
            Ok(self.values.remove(key).is_some())
        }
        async fn get_size(&self, _key: &Key) -> cashier_backend::BackendResult<i64> {
            Ok(-1)
        }
        async fn ping(&self, message: Option<Raw>) -> cashier_backend::BackendResult<Raw> {
            Ok(message.unwrap_or_else(|| Raw::from_static(b"pong")))
        }
        async fn clear(&self) -> cashier_backend::BackendResult<()> {
            self.values.clear();
            self.sets.clear();
            Ok(())
        }
        fn on_remove_callback(&self, _callback: Arc<dyn cashier_backend::RemoveCallback>) {}
    }

    #[tokio::test]
    async fn tagging_unregistered_tag_fails() {
        let registry = TagRegistry::new();
        let backend = SetBackend::default();
        let key = Key::new("user:42:profile");

        let err = registry.tag(&backend, &key, &["profile"]).await.unwrap_err();
        assert!(matches!(err, CacheError::TagNotRegistered(_, _)));
    }

    #[tokio::test]
    async fn delete_tags_removes_every_tagged_key() {
        let registry = TagRegistry::new();
        registry.register("profile", "user:{id}:profile").unwrap();
        let backend = SetBackend::default();

        for id in ["1", "2", "3"] {
            let key = Key::new(format!("user:{id}:profile"));
            backend.set(&key, Raw::from_static(b"v"), None, SetCondition::Always).await.unwrap();
            registry.tag(&backend, &key, &["profile"]).await.unwrap();
        }

        let deleted = registry.delete_tags(&backend, &["profile"]).await.unwrap();
        assert_eq!(deleted, 3);
        assert!(backend.get(&Key::new("user:1:profile")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_key_tags_reports_matching_registered_patterns() {
        let registry = TagRegistry::new();
        registry.register("profile", "user:{id}:profile").unwrap();
        registry.register("billing", "user:{id}:billing").unwrap();

        let tags = registry.get_key_tags(&Key::new("user:42:profile"));
        assert_eq!(tags, vec![Key::new("profile")]);
    }

    #[tokio::test]
    async fn bound_tag_is_rendered_from_the_matching_key_templates_captures() {
        let registry = TagRegistry::new();
        registry.register("user:{uid}", "get_items:{uid}").unwrap();
        let backend = SetBackend::default();

        let tagged = Key::new("get_items:1");
        let untagged = Key::new("get_items:2");
        backend.set(&tagged, Raw::from_static(b"v"), None, SetCondition::Always).await.unwrap();
        backend.set(&untagged, Raw::from_static(b"v"), None, SetCondition::Always).await.unwrap();
        registry.tag(&backend, &tagged, &["user:{uid}"]).await.unwrap();

        assert_eq!(registry.get_key_tags(&tagged), vec![Key::new("user:1")]);

        let deleted = registry.delete_tags(&backend, &["user:1"]).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(backend.get(&tagged).await.unwrap().is_none());
        assert!(backend.get(&untagged).await.unwrap().is_some());
    }
}
