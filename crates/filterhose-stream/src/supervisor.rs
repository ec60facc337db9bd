//! Connection supervisor.
//!
//! One task owns the connection state and runs every transition through a
//! single `select!` loop, so connect and abort never overlap:
//!
//! ```text
//! Idle ──filters──▶ Connecting ──200──▶ Streaming ──stall / filters──▶ Connecting
//!                     │  │                  │
//!                     │  └─420/503/net──▶ Backoff ──delay──▶ Connecting
//!                     └──other status──▶ Aborted          ◀──read error── Streaming
//! ```
//!
//! Any state drops to Idle once the registry is empty.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use filterhose_core::errors::{classify_status, StatusDisposition};
use filterhose_core::{
    BackoffClass, BackoffSet, ByteStream, ConnectionState, Credentials, FilterRegistry,
    FilterSnapshot, StreamConfig, StreamError, StreamEvent, StreamRequest, StreamTransport,
    TransportError,
};

use crate::demux::demultiplex;
use crate::frame::LineFrameParser;
use crate::watchdog::StallWatchdog;

/// Registry shared between callers and the supervisor.
///
/// Callers only ever lock briefly and notify; all I/O happens in the
/// supervisor task.
#[derive(Debug, Default)]
pub(crate) struct SharedFilters {
    registry: Mutex<FilterRegistry>,
    changed: Notify,
}

#[derive(Clone, Copy, Debug)]
struct FilterStatus {
    dirty: bool,
    has_any: bool,
}

impl SharedFilters {
    /// Apply `f`; when `wake` is set and the registry is dirty afterwards,
    /// wake the supervisor. Repeated wakes before it runs coalesce.
    pub(crate) fn update<R>(&self, wake: bool, f: impl FnOnce(&mut FilterRegistry) -> R) -> R {
        let (result, dirty) = {
            let mut registry = self.registry.lock();
            let result = f(&mut registry);
            (result, registry.is_dirty())
        };
        if wake && dirty {
            self.changed.notify_one();
        }
        result
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&FilterRegistry) -> R) -> R {
        f(&self.registry.lock())
    }

    fn status(&self) -> FilterStatus {
        let registry = self.registry.lock();
        FilterStatus {
            dirty: registry.is_dirty(),
            has_any: registry.has_any(),
        }
    }

    /// Clear the dirty flag and return what to connect with, if anything.
    fn take_snapshot(&self) -> Option<FilterSnapshot> {
        let mut registry = self.registry.lock();
        let snapshot = registry.take_snapshot();
        (!snapshot.is_empty()).then_some(snapshot)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Control {
    /// Connect if idle or aborted; reconnect if streaming with unsent changes.
    Reconnect,
    /// Drop any connection and go idle, keeping the registry.
    Abort,
}

/// An open body with its framing state.
struct Connection {
    body: ByteStream,
    parser: LineFrameParser,
}

enum Phase {
    Idle,
    Connecting,
    Streaming(Connection),
    Backoff(Pin<Box<Sleep>>),
    Aborted,
}

impl Phase {
    fn state(&self) -> ConnectionState {
        match self {
            Self::Idle => ConnectionState::Idle,
            Self::Connecting => ConnectionState::Connecting,
            Self::Streaming(_) => ConnectionState::Streaming,
            Self::Backoff(_) => ConnectionState::Backoff,
            Self::Aborted => ConnectionState::Aborted,
        }
    }
}

/// What the client keeps after spawning a supervisor.
pub(crate) struct SupervisorHandle {
    pub(crate) control: mpsc::UnboundedSender<Control>,
    pub(crate) events: broadcast::Sender<StreamEvent>,
    pub(crate) state: watch::Receiver<ConnectionState>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) task: JoinHandle<()>,
}

pub(crate) fn spawn(
    transport: Arc<dyn StreamTransport>,
    credentials: Credentials,
    config: StreamConfig,
    filters: Arc<SharedFilters>,
) -> SupervisorHandle {
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (events, _) = broadcast::channel(config.event_buffer.max(1));
    let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
    let shutdown = CancellationToken::new();

    let supervisor = Supervisor {
        backoffs: BackoffSet::new(config.rate_limit_max()),
        watchdog: StallWatchdog::new(config.stall_timeout()),
        transport,
        credentials,
        config,
        filters,
        control: control_rx,
        events: events.clone(),
        state: state_tx,
        shutdown: shutdown.clone(),
    };
    let task = tokio::spawn(supervisor.run());

    SupervisorHandle {
        control: control_tx,
        events,
        state: state_rx,
        shutdown,
        task,
    }
}

struct Supervisor {
    transport: Arc<dyn StreamTransport>,
    credentials: Credentials,
    config: StreamConfig,
    filters: Arc<SharedFilters>,
    control: mpsc::UnboundedReceiver<Control>,
    events: broadcast::Sender<StreamEvent>,
    state: watch::Sender<ConnectionState>,
    backoffs: BackoffSet,
    watchdog: StallWatchdog,
    shutdown: CancellationToken,
}

impl Supervisor {
    async fn run(mut self) {
        let mut phase = Phase::Idle;
        loop {
            self.state.send_replace(phase.state());
            let next = match phase {
                Phase::Idle => self.idle(false).await,
                Phase::Aborted => self.idle(true).await,
                Phase::Connecting => self.connect().await,
                Phase::Streaming(conn) => self.stream(conn).await,
                Phase::Backoff(delay) => self.backoff(delay).await,
            };
            match next {
                Some(p) => phase = p,
                None => break,
            }
        }
        self.watchdog.cancel();
        self.state.send_replace(ConnectionState::Idle);
        debug!("supervisor stopped");
    }

    /// Wait in Idle or Aborted until there is something to connect with.
    /// Leaving Aborted starts every backoff policy over.
    async fn idle(&mut self, aborted: bool) -> Option<Phase> {
        let next = self.wait_for_filters(aborted).await;
        if aborted && matches!(next, Some(Phase::Connecting)) {
            self.backoffs.reset();
        }
        next
    }

    async fn wait_for_filters(&mut self, aborted: bool) -> Option<Phase> {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return None,
                Some(control) = self.control.recv() => match control {
                    Control::Reconnect if self.filters.status().has_any => {
                        return Some(Phase::Connecting);
                    }
                    Control::Abort if aborted => return Some(Phase::Idle),
                    _ => {}
                },
                _ = self.filters.changed.notified() => {
                    let status = self.filters.status();
                    if status.dirty && status.has_any {
                        return Some(Phase::Connecting);
                    }
                    if status.dirty {
                        self.filters.take_snapshot();
                        if aborted {
                            return Some(Phase::Idle);
                        }
                    }
                }
            }
        }
    }

    #[instrument(skip(self), fields(endpoint = %self.config.endpoint))]
    async fn connect(&mut self) -> Option<Phase> {
        let Some(snapshot) = self.filters.take_snapshot() else {
            debug!("no filters left, staying idle");
            return Some(Phase::Idle);
        };
        let request = StreamRequest::new(&self.config, &self.credentials, &snapshot);

        // Changes made while the request is in flight go out on the next
        // connect; the permit is re-armed once the attempt resolves.
        let mut changed_in_flight = false;
        let outcome = {
            let open = self.transport.open(&request);
            tokio::pin!(open);
            loop {
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return None,
                    Some(control) = self.control.recv() => match control {
                        Control::Abort => {
                            debug!("connect attempt aborted");
                            return Some(Phase::Idle);
                        }
                        Control::Reconnect => changed_in_flight |= self.filters.status().dirty,
                    },
                    _ = self.filters.changed.notified() => {
                        let status = self.filters.status();
                        if !status.has_any {
                            debug!("filters emptied during connect attempt");
                            self.filters.take_snapshot();
                            return Some(Phase::Idle);
                        }
                        changed_in_flight |= status.dirty;
                    }
                    outcome = &mut open => break outcome,
                }
            }
        };
        if changed_in_flight {
            self.filters.changed.notify_one();
        }
        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                return Some(self.retry_after(BackoffClass::Network, StreamError::Network(e)));
            }
        };

        let status = response.status;
        match classify_status(status) {
            StatusDisposition::Stream => {
                self.backoffs.reset();
                self.watchdog.arm();
                info!(
                    track = %snapshot.track,
                    follow = %snapshot.follow,
                    locations = %snapshot.locations,
                    language = %snapshot.language,
                    "stream connected"
                );
                self.emit(StreamEvent::Connect);
                Some(Phase::Streaming(Connection {
                    body: response.body,
                    parser: LineFrameParser::new(),
                }))
            }
            StatusDisposition::Retry(class) => {
                Some(self.retry_after(class, StreamError::HttpStatus { status }))
            }
            StatusDisposition::Fatal => Some(self.fail(StreamError::HttpStatus { status })),
        }
    }

    async fn stream(&mut self, mut conn: Connection) -> Option<Phase> {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    self.close(conn);
                    return None;
                }
                Some(control) = self.control.recv() => match control {
                    Control::Abort => {
                        self.close(conn);
                        return Some(Phase::Idle);
                    }
                    Control::Reconnect if self.filters.status().dirty => {
                        self.close(conn);
                        return Some(Phase::Connecting);
                    }
                    Control::Reconnect => {}
                },
                _ = self.filters.changed.notified() => {
                    let status = self.filters.status();
                    if !status.has_any {
                        self.close(conn);
                        self.filters.take_snapshot();
                        return Some(Phase::Idle);
                    }
                    if status.dirty {
                        debug!("filters changed, reconnecting");
                        self.close(conn);
                        return Some(Phase::Connecting);
                    }
                }
                _ = self.watchdog.expired() => {
                    let error = StreamError::Stalled(self.watchdog.interval());
                    warn!(%error, "stream stalled, reconnecting");
                    self.close(conn);
                    self.emit(StreamEvent::Reconnect {
                        error,
                        delay: Duration::ZERO,
                    });
                    return Some(Phase::Connecting);
                }
                chunk = conn.body.next() => match chunk {
                    Some(Ok(bytes)) => {
                        self.watchdog.on_data();
                        for message in conn.parser.push(&bytes).into_iter().map(demultiplex) {
                            if message.is_recognized() {
                                self.emit(StreamEvent::Message(message));
                            } else {
                                debug!("dropping unrecognized message");
                            }
                        }
                    }
                    Some(Err(e)) => {
                        self.close(conn);
                        return Some(self.retry_after(BackoffClass::Network, StreamError::Network(e)));
                    }
                    None => {
                        self.close(conn);
                        return Some(self.retry_after(
                            BackoffClass::Network,
                            StreamError::Network(TransportError::Closed),
                        ));
                    }
                },
            }
        }
    }

    /// Wait out a backoff delay. Filter changes are picked up by the
    /// following connect; they do not shorten the delay.
    async fn backoff(&mut self, mut delay: Pin<Box<Sleep>>) -> Option<Phase> {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return None,
                _ = delay.as_mut() => return Some(Phase::Connecting),
                Some(control) = self.control.recv() => {
                    if control == Control::Abort {
                        return Some(Phase::Idle);
                    }
                }
                _ = self.filters.changed.notified() => {
                    if !self.filters.status().has_any {
                        self.filters.take_snapshot();
                        return Some(Phase::Idle);
                    }
                }
            }
        }
    }

    fn retry_after(&mut self, class: BackoffClass, error: StreamError) -> Phase {
        match self.backoffs.next(class) {
            Ok(delay) => {
                warn!(
                    %error,
                    kind = error.error_kind(),
                    delay_ms = delay.as_millis() as u64,
                    "reconnecting after backoff"
                );
                self.emit(StreamEvent::Reconnect { error, delay });
                Phase::Backoff(Box::pin(tokio::time::sleep(delay)))
            }
            Err(exhausted) => {
                warn!(%error, "backoff exhausted");
                self.fail(StreamError::RateLimitExceeded(exhausted))
            }
        }
    }

    fn fail(&mut self, error: StreamError) -> Phase {
        self.watchdog.cancel();
        error!(%error, kind = error.error_kind(), code = ?error.code(), "stream failed");
        self.emit(StreamEvent::Error { error });
        Phase::Aborted
    }

    /// Tear down an open connection: stop the watchdog, then drop the body
    /// and any partial frame.
    fn close(&mut self, conn: Connection) {
        self.watchdog.cancel();
        drop(conn);
        debug!("connection closed");
    }

    fn emit(&self, event: StreamEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use filterhose_core::FilterCategory;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn update_wakes_only_when_dirty() {
        let filters = SharedFilters::default();

        filters.update(true, |r| r.remove(FilterCategory::Tracking, "ghost"));
        let woke = tokio::time::timeout(Duration::from_millis(10), filters.changed.notified()).await;
        assert!(woke.is_err(), "clean no-op must not wake");

        filters.update(true, |r| r.add(FilterCategory::Tracking, "tacos"));
        filters.update(true, |r| r.add(FilterCategory::Tracking, "tortas"));
        let woke = tokio::time::timeout(Duration::from_millis(10), filters.changed.notified()).await;
        assert!(woke.is_ok());
        // Both changes coalesced into one permit
        let again = tokio::time::timeout(Duration::from_millis(10), filters.changed.notified()).await;
        assert!(again.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn staged_update_does_not_wake() {
        let filters = SharedFilters::default();
        let changed = filters.update(false, |r| r.add(FilterCategory::Follow, "12"));
        assert!(changed);
        let woke = tokio::time::timeout(Duration::from_millis(10), filters.changed.notified()).await;
        assert!(woke.is_err());
        assert!(filters.status().dirty);
    }

    #[test]
    fn take_snapshot_clears_dirty_and_reports_empty() {
        let filters = SharedFilters::default();
        filters.update(false, |r| r.add(FilterCategory::Tracking, "tacos"));
        let snap = filters.take_snapshot().unwrap();
        assert_eq!(snap.track, "tacos");
        assert!(!filters.status().dirty);

        filters.update(false, |r| r.remove(FilterCategory::Tracking, "tacos"));
        assert!(filters.take_snapshot().is_none());
        assert!(!filters.status().dirty);
        assert!(!filters.read(|r| r.has_any()));
    }
}
