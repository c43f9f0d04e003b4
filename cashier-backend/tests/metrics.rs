//! Verifies that [`Instrumented`] records the expected metrics, labeled by
//! backend and command, for cache operations.

#![cfg(feature = "metrics")]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cashier_backend::{Backend, BackendResult, DeleteStatus, Expiry, Instrumented, RemoveCallback, SetCondition};
use cashier_core::{BackendLabel, Key, Raw};
use dashmap::DashMap;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use metrics_util::{CompositeKey, MetricKind};

type SnapshotEntry = (
    CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
);

/// Simple in-memory backend for exercising [`Instrumented`].
#[derive(Clone, Default)]
struct TestBackend {
    store: Arc<DashMap<Key, Raw>>,
}

#[async_trait]
impl Backend for TestBackend {
    fn label(&self) -> BackendLabel {
        BackendLabel::new_static("test")
    }

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

    async fn set_lock(&self, _key: &Key, _owner: &Raw, _expire: Duration) -> BackendResult<bool> {
        Ok(true)
    }

    async fn unlock(&self, _key: &Key, _owner: &Raw) -> BackendResult<bool> {
        Ok(true)
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

fn find_counter(entries: &[SnapshotEntry], name: &str, backend: &str, command: &str) -> Option<u64> {
    for (key, _, _, value) in entries {
        if key.kind() == MetricKind::Counter && key.key().name() == name {
            let labels: Vec<_> = key.key().labels().collect();
            let matches = labels.iter().any(|l| l.key() == "backend" && l.value() == backend)
                && labels.iter().any(|l| l.key() == "command" && l.value() == command);
            if matches
                && let DebugValue::Counter(v) = *value
            {
                return Some(v);
            }
        }
    }
    None
}

fn histogram_count(entries: &[SnapshotEntry], name: &str, backend: &str, command: &str) -> usize {
    for (key, _, _, value) in entries {
        if key.kind() == MetricKind::Histogram && key.key().name() == name {
            let labels: Vec<_> = key.key().labels().collect();
            let matches = labels.iter().any(|l| l.key() == "backend" && l.value() == backend)
                && labels.iter().any(|l| l.key() == "command" && l.value() == command);
            if matches
                && let DebugValue::Histogram(v) = value
            {
                return v.len();
            }
        }
    }
    0
}

fn bytes_counter(entries: &[SnapshotEntry], name: &str, backend: &str) -> Option<u64> {
    for (key, _, _, value) in entries {
        if key.kind() == MetricKind::Counter
            && key.key().name() == name
            && key.key().labels().any(|l| l.key() == "backend" && l.value() == backend)
            && let DebugValue::Counter(v) = *value
        {
            return Some(v);
        }
    }
    None
}

#[test]
fn records_set_and_get_metrics() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let backend = Instrumented::new(TestBackend::default());
            let key = Key::new("greeting");

            backend
                .set(&key, Raw::from_static(b"hello"), None, SetCondition::Always)
                .await
                .unwrap();
            backend.get(&key).await.unwrap();
            backend.get(&Key::new("missing")).await.unwrap();
        })
    });

    let entries = snapshotter.snapshot().into_vec();

    assert_eq!(
        find_counter(&entries, "cashier_backend_operations_total", "test", "set"),
        Some(1)
    );
    assert_eq!(
        find_counter(&entries, "cashier_backend_operations_total", "test", "get"),
        Some(2)
    );
    assert_eq!(
        histogram_count(&entries, "cashier_backend_operation_duration_seconds", "test", "set"),
        1
    );
    assert_eq!(
        histogram_count(&entries, "cashier_backend_operation_duration_seconds", "test", "get"),
        2
    );
    assert_eq!(
        bytes_counter(&entries, "cashier_backend_write_bytes_total", "test"),
        Some(5)
    );
    assert_eq!(
        bytes_counter(&entries, "cashier_backend_read_bytes_total", "test"),
        Some(5)
    );
}

#[test]
fn records_operation_errors() {
    struct FailingBackend;

    #[async_trait]
    impl Backend for FailingBackend {
        fn label(&self) -> BackendLabel {
            BackendLabel::new_static("failing")
        }

        async fn set(&self, _key: &Key, _value: Raw, _expire: Option<Duration>, _condition: SetCondition) -> BackendResult<bool> {
            Err(cashier_backend::BackendError::Timeout)
        }

        async fn get(&self, _key: &Key) -> BackendResult<Option<Raw>> {
            Ok(None)
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

        async fn delete(&self, _key: &Key) -> BackendResult<DeleteStatus> {
            Ok(DeleteStatus::Missing)
        }

        async fn expire(&self, _key: &Key, _ttl: Duration) -> BackendResult<bool> {
            Ok(false)
        }

        async fn get_expire(&self, _key: &Key) -> BackendResult<Expiry> {
            Ok(Expiry::NotFound)
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

        async fn set_lock(&self, _key: &Key, _owner: &Raw, _expire: Duration) -> BackendResult<bool> {
            Ok(false)
        }

        async fn unlock(&self, _key: &Key, _owner: &Raw) -> BackendResult<bool> {
            Ok(false)
        }

        async fn get_size(&self, _key: &Key) -> BackendResult<i64> {
            Ok(-1)
        }

        async fn ping(&self, message: Option<Raw>) -> BackendResult<Raw> {
            Ok(message.unwrap_or_default())
        }

        async fn clear(&self) -> BackendResult<()> {
            Ok(())
        }

        fn on_remove_callback(&self, _callback: Arc<dyn RemoveCallback>) {}
    }

    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let backend = Instrumented::new(FailingBackend);
            let _ = backend.set(&Key::new("k"), Raw::from_static(b"v"), None, SetCondition::Always).await;
        })
    });

    let entries = snapshotter.snapshot().into_vec();

    assert_eq!(
        find_counter(&entries, "cashier_backend_operation_errors_total", "failing", "set"),
        Some(1)
    );
}
