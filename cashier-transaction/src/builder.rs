use std::time::Duration;

use cashier_backend::Backend;
use cashier_core::BackendLabel;

use crate::backend::{Mode, TransactionBackend};

/// Builder for [`TransactionBackend`].
pub struct TransactionBackendBuilder<B> {
    label: BackendLabel,
    target: B,
    mode: Mode,
    lock_ttl: Duration,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl<B: Backend + Clone + 'static> TransactionBackendBuilder<B> {
    pub(crate) fn new(target: B) -> Self {
        Self {
            label: BackendLabel::new_static("transaction"),
            target,
            mode: Mode::Fast,
            lock_ttl: Duration::from_secs(10),
            retry_attempts: 5,
            retry_delay: Duration::from_millis(50),
        }
    }

    /// Overrides the backend label. Defaults to `"transaction"`.
    pub fn label(mut self, label: impl Into<BackendLabel>) -> Self {
        self.label = label.into();
        self
    }

    /// Isolation mode. Defaults to [`Mode::Fast`].
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// TTL applied to locks acquired in [`Mode::Locked`]/[`Mode::Serializable`].
    /// Defaults to 10 seconds.
    pub fn lock_ttl(mut self, lock_ttl: Duration) -> Self {
        self.lock_ttl = lock_ttl;
        self
    }

    /// Number of retries when a lock is contended, before giving up with
    /// [`cashier_backend::BackendError::Locked`]. Defaults to 5.
    pub fn retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }

    /// Delay between lock-acquisition retries. Defaults to 50ms.
    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Builds the [`TransactionBackend`].
    pub fn build(self) -> TransactionBackend<B> {
        TransactionBackend::new(self.label, self.target, self.mode, self.lock_ttl, self.retry_attempts, self.retry_delay)
    }
}
