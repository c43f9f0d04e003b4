//! Integration tests for in-memory backend capacity eviction and TTL behavior.

use std::time::Duration;

use cashier_backend::{Backend, SetCondition};
use cashier_core::{Key, Raw};
use cashier_memory::MemoryBackend;

fn key(id: u32) -> Key {
    Key::new(format!("entry:{id}"))
}

#[tokio::test]
async fn entry_count_eviction_keeps_most_recently_inserted() {
    let backend = MemoryBackend::builder().max_entries(3).sweep_interval(None).build();

    for i in 1..=3 {
        backend.set(&key(i), Raw::from_static(b"v"), None, SetCondition::Always).await.unwrap();
    }
    for i in 1..=3 {
        assert!(backend.get(&key(i)).await.unwrap().is_some(), "entry {i} should exist");
    }

    backend.set(&key(4), Raw::from_static(b"v"), None, SetCondition::Always).await.unwrap();

    assert!(backend.get(&key(1)).await.unwrap().is_none(), "oldest entry should be evicted");
    for i in 2..=4 {
        assert!(backend.get(&key(i)).await.unwrap().is_some(), "entry {i} should exist");
    }
}

#[tokio::test]
async fn overwriting_an_existing_key_does_not_evict() {
    let backend = MemoryBackend::builder().max_entries(2).sweep_interval(None).build();

    backend.set(&key(1), Raw::from_static(b"a"), None, SetCondition::Always).await.unwrap();
    backend.set(&key(2), Raw::from_static(b"b"), None, SetCondition::Always).await.unwrap();
    backend.set(&key(1), Raw::from_static(b"a2"), None, SetCondition::Always).await.unwrap();

    assert_eq!(backend.get(&key(1)).await.unwrap(), Some(Raw::from_static(b"a2")));
    assert!(backend.get(&key(2)).await.unwrap().is_some());
}

#[tokio::test]
async fn background_sweeper_evicts_expired_entries_without_a_read() {
    let backend = MemoryBackend::builder()
        .max_entries(100)
        .sweep_interval(Some(Duration::from_millis(20)))
        .build();

    backend
        .set(&key(1), Raw::from_static(b"v"), Some(Duration::from_millis(1)), SetCondition::Always)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(backend.get(&key(1)).await.unwrap().is_none());
}

#[tokio::test]
async fn set_if_absent_respects_existing_key() {
    let backend = MemoryBackend::builder().build();

    assert!(backend.set(&key(1), Raw::from_static(b"a"), None, SetCondition::IfAbsent).await.unwrap());
    assert!(!backend.set(&key(1), Raw::from_static(b"b"), None, SetCondition::IfAbsent).await.unwrap());
    assert_eq!(backend.get(&key(1)).await.unwrap(), Some(Raw::from_static(b"a")));
}

#[tokio::test]
async fn delete_match_removes_only_matching_keys() {
    let backend = MemoryBackend::builder().build();
    backend.set(&Key::new("session:1"), Raw::from_static(b"a"), None, SetCondition::Always).await.unwrap();
    backend.set(&Key::new("session:2"), Raw::from_static(b"b"), None, SetCondition::Always).await.unwrap();
    backend.set(&Key::new("order:1"), Raw::from_static(b"c"), None, SetCondition::Always).await.unwrap();

    backend.delete_match("session:*").await.unwrap();

    assert!(backend.get(&Key::new("session:1")).await.unwrap().is_none());
    assert!(backend.get(&Key::new("session:2")).await.unwrap().is_none());
    assert!(backend.get(&Key::new("order:1")).await.unwrap().is_some());
}
