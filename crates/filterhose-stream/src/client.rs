use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use filterhose_core::{
    ConfigError, ConnectionState, Credentials, FilterCategory, StreamConfig, StreamEvent,
    StreamTransport,
};

use crate::http::{HttpTransport, RequestSigner};
use crate::supervisor::{self, Control, SharedFilters};

/// Handle to one filtered stream.
///
/// Filter mutations return immediately and are applied by a background
/// supervisor, which reconnects with the new filter set. Dropping the handle
/// stops the supervisor; use [`shutdown`](Self::shutdown) to wait for it.
pub struct FilterStream {
    filters: Arc<SharedFilters>,
    control: mpsc::UnboundedSender<Control>,
    events: broadcast::Sender<StreamEvent>,
    state: watch::Receiver<ConnectionState>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl FilterStream {
    /// Stream over HTTPS, authorizing each request through `signer`.
    pub fn new(
        credentials: Credentials,
        config: StreamConfig,
        signer: Arc<dyn RequestSigner>,
    ) -> Result<Self, ConfigError> {
        let transport =
            HttpTransport::new(signer).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Self::with_transport(Arc::new(transport), credentials, config)
    }

    /// Must be called inside a tokio runtime.
    pub fn with_transport(
        transport: Arc<dyn StreamTransport>,
        credentials: Credentials,
        config: StreamConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let filters = Arc::new(SharedFilters::default());
        let handle = supervisor::spawn(transport, credentials, config, filters.clone());
        Ok(Self {
            filters,
            control: handle.control,
            events: handle.events,
            state: handle.state,
            shutdown: handle.shutdown,
            task: Some(handle.task),
        })
    }

    /// Events from this point on. A receiver that falls more than the
    /// configured buffer behind skips ahead with `Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    // ── Filter mutation ──

    /// Add one occurrence of `value`. Returns true when the wire set changed,
    /// in which case a reconnect is scheduled.
    pub fn add(&self, category: FilterCategory, value: &str) -> bool {
        self.filters.update(true, |r| r.add(category, value))
    }

    /// Drop one occurrence of `value`. Unknown values are ignored.
    pub fn remove(&self, category: FilterCategory, value: &str) -> bool {
        self.filters.update(true, |r| r.remove(category, value))
    }

    /// Apply several additions with a single reconnect.
    pub fn add_many<I, S>(&self, category: FilterCategory, values: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filters.update(true, |r| r.add_many(category, values))
    }

    pub fn remove_many<I, S>(&self, category: FilterCategory, values: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filters.update(true, |r| r.remove_many(category, values))
    }

    /// Record an addition without reconnecting. It goes out with the next
    /// connect, or on [`reconnect`](Self::reconnect).
    pub fn stage_add(&self, category: FilterCategory, value: &str) -> bool {
        self.filters.update(false, |r| r.add(category, value))
    }

    pub fn stage_remove(&self, category: FilterCategory, value: &str) -> bool {
        self.filters.update(false, |r| r.remove(category, value))
    }

    pub fn track(&self, keyword: &str) -> bool {
        self.add(FilterCategory::Tracking, keyword)
    }

    pub fn untrack(&self, keyword: &str) -> bool {
        self.remove(FilterCategory::Tracking, keyword)
    }

    pub fn follow(&self, user_id: &str) -> bool {
        self.add(FilterCategory::Follow, user_id)
    }

    pub fn unfollow(&self, user_id: &str) -> bool {
        self.remove(FilterCategory::Follow, user_id)
    }

    /// `bbox` is a `"sw_lng,sw_lat,ne_lng,ne_lat"` string, passed through as-is.
    pub fn locate(&self, bbox: &str) -> bool {
        self.add(FilterCategory::Location, bbox)
    }

    pub fn unlocate(&self, bbox: &str) -> bool {
        self.remove(FilterCategory::Location, bbox)
    }

    pub fn add_language(&self, code: &str) -> bool {
        self.add(FilterCategory::Language, code)
    }

    pub fn remove_language(&self, code: &str) -> bool {
        self.remove(FilterCategory::Language, code)
    }

    // ── Filter queries ──

    pub fn values(&self, category: FilterCategory) -> Vec<String> {
        self.filters.read(|r| r.values(category))
    }

    /// Tracked keywords, in insertion order.
    pub fn tracking(&self) -> Vec<String> {
        self.values(FilterCategory::Tracking)
    }

    pub fn count(&self, category: FilterCategory, value: &str) -> u32 {
        self.filters.read(|r| r.count(category, value))
    }

    pub fn has_any(&self) -> bool {
        self.filters.read(|r| r.has_any())
    }

    // ── Connection control ──

    /// Connect when idle or aborted; when streaming, reconnect only if there
    /// are staged changes not yet sent.
    pub fn reconnect(&self) {
        let _ = self.control.send(Control::Reconnect);
    }

    /// Drop the connection and go idle. Filters are kept. Idempotent.
    pub fn abort(&self) {
        let _ = self.control.send(Control::Abort);
    }

    /// Stop the supervisor and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for FilterStream {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for FilterStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterStream")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
