//! Builder for configuring [`MemoryBackend`].

use std::time::Duration;

use cashier_core::BackendLabel;

use crate::backend::MemoryBackend;

/// Builder for creating and configuring a [`MemoryBackend`].
///
/// Use [`MemoryBackend::builder`] to create a new builder instance.
///
/// # Examples
///
/// ```
/// use cashier_memory::MemoryBackend;
///
/// let backend = MemoryBackend::builder().max_entries(10_000).build();
/// ```
pub struct MemoryBackendBuilder {
    max_entries: usize,
    label: BackendLabel,
    sweep_interval: Option<Duration>,
}

impl MemoryBackendBuilder {
    pub(crate) fn new() -> Self {
        Self {
            max_entries: 1000,
            label: BackendLabel::new_static("memory"),
            sweep_interval: Some(Duration::from_secs(1)),
        }
    }

    /// Maximum number of entries this backend holds before evicting by
    /// insertion order.
    ///
    /// # Default
    ///
    /// `1000`
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Sets a custom label for this backend, used in metrics and prefix
    /// routing diagnostics.
    ///
    /// # Default
    ///
    /// `"memory"`
    pub fn label(mut self, label: impl Into<BackendLabel>) -> Self {
        self.label = label.into();
        self
    }

    /// How often the background sweep evicts expired entries. `None` disables
    /// the background sweep; entries still expire lazily on read.
    ///
    /// # Default
    ///
    /// `Some(Duration::from_secs(1))`
    pub fn sweep_interval(mut self, interval: Option<Duration>) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Builds the [`MemoryBackend`], spawning its background sweeper task
    /// unless [`Self::sweep_interval`] was set to `None`.
    pub fn build(self) -> MemoryBackend {
        let backend = MemoryBackend::new(self.label, self.max_entries);
        if let Some(interval) = self.sweep_interval {
            backend.spawn_sweeper(interval);
        }
        backend
    }
}
