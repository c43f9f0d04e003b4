//! Builder for configuring [`ClientSideBackend`].

use std::sync::Arc;
use std::time::Duration;

use cashier_backend::Backend;
use cashier_core::BackendLabel;

use crate::backend::{ClientSideBackend, DEFAULT_RECONNECT_WAIT};
use crate::broadcast::BroadcastSource;

/// Builder for creating and configuring a [`ClientSideBackend`].
///
/// Use [`ClientSideBackend::builder`] to create a new builder instance.
pub struct ClientSideBackendBuilder<R, L> {
    remote: R,
    local: L,
    prefix: Arc<str>,
    label: BackendLabel,
    recently_updated_ttl: Duration,
    reconnect_wait: Duration,
}

impl<R, L> ClientSideBackendBuilder<R, L>
where
    R: Backend + Clone + BroadcastSource + 'static,
    L: Backend + Clone + 'static,
{
    pub(crate) fn new(remote: R, local: L, prefix: impl Into<Arc<str>>) -> Self {
        Self {
            remote,
            local,
            prefix: prefix.into(),
            label: BackendLabel::new_static("client-side"),
            recently_updated_ttl: Duration::from_secs(5),
            reconnect_wait: DEFAULT_RECONNECT_WAIT,
        }
    }

    /// Sets a custom label for this backend, used in metrics and prefix
    /// routing diagnostics.
    ///
    /// # Default
    ///
    /// `"client-side"`
    pub fn label(mut self, label: impl Into<BackendLabel>) -> Self {
        self.label = label.into();
        self
    }

    /// How long a key stays in the "recently updated by this client" set
    /// after a local write, suppressing the self-origin invalidation the
    /// remote store's broadcast will otherwise deliver for it.
    ///
    /// # Default
    ///
    /// `5 seconds`
    pub fn recently_updated_ttl(mut self, ttl: Duration) -> Self {
        self.recently_updated_ttl = ttl;
        self
    }

    /// How long the listener waits before resubscribing after the
    /// invalidation channel drops.
    ///
    /// # Default
    ///
    /// `1 second`
    pub fn reconnect_wait(mut self, wait: Duration) -> Self {
        self.reconnect_wait = wait;
        self
    }

    /// Builds the [`ClientSideBackend`]. The invalidation listener is not
    /// started automatically — call [`ClientSideBackend::spawn_listener`]
    /// with an [`cashier_core::Offload`] implementation once the backend is
    /// in its final place.
    pub fn build(self) -> ClientSideBackend<R, L> {
        ClientSideBackend::new(self.label, self.remote, self.local, self.prefix, self.recently_updated_ttl, self.reconnect_wait)
    }
}
