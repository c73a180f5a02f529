//! Connection manager.
//!
//! A [`SyncManager`] owns one logical connection to the server. A background
//! task connects, reconnects with exponential backoff, decodes inbound frames,
//! routes them to receivers by `_sync_type` and correlates responses with
//! pending requests.
//!
//! ## Correlation
//!
//! The server counts the frames it receives on a connection, starting at 0.
//! A message answering request `n` carries `n` in `_resp_for` (or in
//! `_no_resp_for` when there is no payload). The manager numbers outbound
//! frames the same way; every frame consumes a sequence number whether or not
//! it asks for a response. Numbering restarts on every connection and pending
//! requests of a lost connection are abandoned.
//!
//! ## Ordering
//!
//! Inbound messages are handled one at a time in receipt order, on the
//! manager task. For each message, `_no_resp_for` entries resolve first, then
//! receivers run, then `_resp_for` entries resolve with the first non-empty
//! receiver result.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use entangle_core::{fields, Operation, Reply, ResponseError, WireMessage, FLAG_RESPONSE_REQUESTED};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::config::ManagerConfig;
use crate::error::{Result, SyncError};
use crate::transport::{Connection, Connector};

/// How a correlated request ended.
pub type Outcome = std::result::Result<Reply, ResponseError>;

/// A handler for inbound messages of one type.
///
/// Its result feeds response correlation: the first non-empty `Ok` of all
/// receivers answers the request the message responds to.
pub type Receiver =
    Arc<dyn Fn(&WireMessage, &ReceiveContext) -> anyhow::Result<Reply> + Send + Sync>;

/// Runs on the settling task right before the request's [`Response`]
/// resolves.
pub type SettleCallback = Box<dyn FnOnce(&Outcome) + Send>;

type ManagerHook = Arc<dyn Fn(&SyncManager) + Send + Sync>;
type SetupFailedHook = Arc<dyn Fn(u32, &SyncError) + Send + Sync>;

/// Handle returned by [`SyncManager::on_receive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiverId(u64);

/// Lifecycle of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Created but not started.
    Idle,
    /// An attempt to connect is in progress.
    Connecting,
    /// The connection is established.
    Open,
    /// The connection failed or was lost; waiting out the backoff delay.
    Reconnecting,
    /// Closed for good.
    Shutdown,
}

/// Passed to every receiver invocation.
#[derive(Clone)]
pub struct ReceiveContext {
    manager: SyncManager,
}

impl ReceiveContext {
    /// The manager that received the message.
    pub fn manager(&self) -> &SyncManager {
        &self.manager
    }
}

/// Options for [`SyncManager::synchronize`].
#[derive(Default)]
pub struct SendOptions {
    response: bool,
    on_settle: Option<SettleCallback>,
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the server for a correlated response.
    pub fn with_response(mut self) -> Self {
        self.response = true;
        self
    }

    /// Run `f` when the response settles. Ignored unless a response is
    /// requested.
    pub fn on_settle<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&Outcome) + Send + 'static,
    {
        self.on_settle = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for SendOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendOptions")
            .field("response", &self.response)
            .field("on_settle", &self.on_settle.is_some())
            .finish()
    }
}

/// Future resolving with the outcome of a correlated request.
#[derive(Debug)]
pub struct Response {
    seq: u64,
    rx: oneshot::Receiver<Outcome>,
}

impl Response {
    /// Sequence number the request was sent under.
    pub fn sequence(&self) -> u64 {
        self.seq
    }
}

impl Future for Response {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(ResponseError::Abandoned)))
    }
}

struct PendingRequest {
    tx: oneshot::Sender<Outcome>,
    on_settle: Option<SettleCallback>,
}

impl PendingRequest {
    fn complete(self, outcome: Outcome) {
        if let Some(on_settle) = self.on_settle {
            on_settle(&outcome);
        }
        let _ = self.tx.send(outcome);
    }
}

#[derive(Default)]
struct Hooks {
    on_open: Option<ManagerHook>,
    on_close: Option<ManagerHook>,
    on_setup_failed: Option<SetupFailedHook>,
}

struct State {
    url: Option<String>,
    started: bool,
    /// Bumped on every successful connect.
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    next_seq: u64,
    pending: HashMap<u64, PendingRequest>,
    receivers: HashMap<String, Vec<(ReceiverId, Receiver)>>,
    next_receiver_id: u64,
    hooks: Hooks,
    failed_attempts: u32,
}

struct Inner {
    config: ManagerConfig,
    connector: Arc<dyn Connector>,
    phase: watch::Sender<ConnectionState>,
    state: Mutex<State>,
}

/// Client side of the sync protocol.
///
/// Cheap to clone; all clones share one connection. The background task
/// stops when [`close`](Self::close) is called or the last handle is dropped.
#[derive(Clone)]
pub struct SyncManager {
    inner: Arc<Inner>,
}

impl SyncManager {
    /// Create a manager without connecting.
    ///
    /// Register receivers and hooks, then call [`start`](Self::start).
    pub fn new(config: ManagerConfig, connector: impl Connector + 'static) -> Self {
        let (phase, _) = watch::channel(ConnectionState::Idle);
        let state = State {
            url: Some(config.url.clone()),
            started: false,
            generation: 0,
            outbound: None,
            next_seq: 0,
            pending: HashMap::new(),
            receivers: HashMap::new(),
            next_receiver_id: 0,
            hooks: Hooks::default(),
            failed_attempts: 0,
        };
        Self {
            inner: Arc::new(Inner {
                config,
                connector: Arc::new(connector),
                phase,
                state: Mutex::new(state),
            }),
        }
    }

    /// Create a manager and start connecting immediately.
    ///
    /// Must be called within a Tokio runtime.
    pub fn connect(config: ManagerConfig, connector: impl Connector + 'static) -> Self {
        let manager = Self::new(config, connector);
        manager.start();
        manager
    }

    /// Spawn the connection task. Does nothing if already started or closed.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.started || state.url.is_none() {
                return;
            }
            state.started = true;
        }
        let weak = Arc::downgrade(&self.inner);
        let phase = self.inner.phase.subscribe();
        tokio::spawn(run(weak, phase));
    }

    /// Reconnect target; `None` once closed.
    pub fn url(&self) -> Option<String> {
        self.inner.state.lock().url.clone()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.phase.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Wait until the connection is open.
    ///
    /// Fails with [`SyncError::Closed`] if the manager is closed first.
    pub async fn wait_open(&self) -> Result<()> {
        let mut phase = self.inner.phase.subscribe();
        let reached = phase
            .wait_for(|s| matches!(s, ConnectionState::Open | ConnectionState::Shutdown))
            .await
            .map(|s| *s)
            .map_err(|_| SyncError::Closed)?;
        match reached {
            ConnectionState::Open => Ok(()),
            _ => Err(SyncError::Closed),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Hooks
    // ─────────────────────────────────────────────────────────────────────

    /// Called each time a connection opens. Replaces any previous hook.
    pub fn on_open<F>(&self, f: F)
    where
        F: Fn(&SyncManager) + Send + Sync + 'static,
    {
        self.inner.state.lock().hooks.on_open = Some(Arc::new(f));
    }

    /// Called each time an open connection goes away. Replaces any previous
    /// hook.
    pub fn on_close<F>(&self, f: F)
    where
        F: Fn(&SyncManager) + Send + Sync + 'static,
    {
        self.inner.state.lock().hooks.on_close = Some(Arc::new(f));
    }

    /// Called when a connection attempt fails, with the number of failed
    /// attempts since the last successful open (0 on the first failure).
    /// Replaces any previous hook.
    pub fn on_connection_setup_failed<F>(&self, f: F)
    where
        F: Fn(u32, &SyncError) + Send + Sync + 'static,
    {
        self.inner.state.lock().hooks.on_setup_failed = Some(Arc::new(f));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Receivers
    // ─────────────────────────────────────────────────────────────────────

    /// Register a receiver for messages of `sync_type`.
    pub fn on_receive<F>(&self, sync_type: impl Into<String>, receiver: F) -> ReceiverId
    where
        F: Fn(&WireMessage, &ReceiveContext) -> anyhow::Result<Reply> + Send + Sync + 'static,
    {
        let mut state = self.inner.state.lock();
        let id = ReceiverId(state.next_receiver_id);
        state.next_receiver_id += 1;
        state
            .receivers
            .entry(sync_type.into())
            .or_default()
            .push((id, Arc::new(receiver)));
        id
    }

    /// Unregister a receiver. Returns whether it was registered.
    pub fn remove_on_receive(&self, sync_type: &str, id: ReceiverId) -> bool {
        let mut state = self.inner.state.lock();
        let Some(receivers) = state.receivers.get_mut(sync_type) else {
            return false;
        };
        let before = receivers.len();
        receivers.retain(|(rid, _)| *rid != id);
        before != receivers.len()
    }

    /// Types that have at least one receiver.
    pub fn receiver_types(&self) -> Vec<String> {
        let state = self.inner.state.lock();
        let mut types: Vec<String> = state
            .receivers
            .iter()
            .filter(|(_, receivers)| !receivers.is_empty())
            .map(|(t, _)| t.clone())
            .collect();
        types.sort();
        types
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sending
    // ─────────────────────────────────────────────────────────────────────

    /// Send a message.
    ///
    /// Sets `_sync_operation` to `sync` when absent. With a response
    /// requested, sets `_flags` and returns a [`Response`] that resolves when
    /// the server answers, the request times out, or the connection goes
    /// away.
    pub fn synchronize(
        &self,
        mut message: WireMessage,
        options: SendOptions,
    ) -> Result<Option<Response>> {
        if !message.contains(fields::OPERATION) {
            message = message.with_operation(Operation::Sync);
        }
        if options.response {
            message.insert(fields::FLAGS, Value::from(FLAG_RESPONSE_REQUESTED));
        }
        let frame = message.encode()?;

        let mut state = self.inner.state.lock();
        if state.url.is_none() {
            return Err(SyncError::Closed);
        }
        let Some(outbound) = state.outbound.clone() else {
            return Err(SyncError::NotConnected);
        };

        let seq = state.next_seq;
        state.next_seq += 1;

        let response = if options.response {
            let (tx, rx) = oneshot::channel();
            state.pending.insert(
                seq,
                PendingRequest {
                    tx,
                    on_settle: options.on_settle,
                },
            );
            if let Some(timeout) = self.inner.config.request_timeout {
                match tokio::runtime::Handle::try_current() {
                    Ok(runtime) => {
                        let weak = Arc::downgrade(&self.inner);
                        let generation = state.generation;
                        runtime.spawn(async move {
                            tokio::time::sleep(timeout).await;
                            if let Some(inner) = weak.upgrade() {
                                inner.expire(generation, seq);
                            }
                        });
                    }
                    Err(_) => warn!(seq, "no runtime available, request timeout not armed"),
                }
            }
            Some(Response { seq, rx })
        } else {
            None
        };

        // Sent under the lock so wire order matches sequence order.
        if outbound.send(frame).is_err() {
            state.pending.remove(&seq);
            return Err(SyncError::NotConnected);
        }
        drop(state);

        debug!(
            seq,
            sync_type = message.sync_type().unwrap_or(""),
            operation = message.operation(),
            "sent"
        );
        Ok(response)
    }

    /// Send without asking for a response.
    pub fn send(&self, message: WireMessage) -> Result<()> {
        self.synchronize(message, SendOptions::new()).map(|_| ())
    }

    /// Send and ask for a response.
    pub fn request(&self, message: WireMessage) -> Result<Response> {
        self.synchronize(message, SendOptions::new().with_response())?
            .ok_or(SyncError::NotConnected)
    }

    /// Close permanently.
    ///
    /// Forgets the reconnect target and releases the connection. Pending
    /// requests are not answered; they are dropped and their awaiters
    /// observe [`ResponseError::Abandoned`]. Calling it again does nothing.
    pub fn close(&self) {
        if self.inner.phase.send_replace(ConnectionState::Shutdown) == ConnectionState::Shutdown {
            return;
        }
        let pending: Vec<PendingRequest> = {
            let mut state = self.inner.state.lock();
            state.url = None;
            state.outbound = None;
            state.pending.drain().map(|(_, p)| p).collect()
        };
        info!(abandoned = pending.len(), "connection manager closed");
        for request in pending {
            request.complete(Err(ResponseError::Abandoned));
        }
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn ptr_eq(&self, other: &SyncManager) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for SyncManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncManager")
            .field("url", &self.url())
            .field("state", &self.state())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection task
// ─────────────────────────────────────────────────────────────────────────────

impl Inner {
    fn manager(self: &Arc<Self>) -> SyncManager {
        SyncManager {
            inner: Arc::clone(self),
        }
    }

    /// Move to `next` unless already shut down.
    fn set_phase(&self, next: ConnectionState) {
        self.phase.send_if_modified(|current| {
            if *current == ConnectionState::Shutdown || *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn begin_attempt(&self) -> Option<(String, Arc<dyn Connector>)> {
        let url = self.state.lock().url.clone()?;
        if *self.phase.borrow() == ConnectionState::Shutdown {
            return None;
        }
        self.set_phase(ConnectionState::Connecting);
        debug!(%url, "connecting");
        Some((url, Arc::clone(&self.connector)))
    }

    fn connection_setup_failed(&self, error: &SyncError) {
        let (count, hook) = {
            let mut state = self.state.lock();
            let count = state.failed_attempts;
            state.failed_attempts = state.failed_attempts.saturating_add(1);
            (count, state.hooks.on_setup_failed.clone())
        };
        self.set_phase(ConnectionState::Reconnecting);
        warn!(attempt = count, error = %error, "connection setup failed");
        if let Some(hook) = hook {
            hook(count, error);
        }
    }

    /// Install the outbound channel of a fresh connection. Returns `false`
    /// if the manager was closed meanwhile.
    fn opened(self: &Arc<Self>, outbound: mpsc::UnboundedSender<String>) -> bool {
        let hook = {
            let mut state = self.state.lock();
            if state.url.is_none() {
                return false;
            }
            state.outbound = Some(outbound);
            state.next_seq = 0;
            state.generation += 1;
            state.failed_attempts = 0;
            state.hooks.on_open.clone()
        };
        self.set_phase(ConnectionState::Open);
        info!(url = %self.config.url, "connection open");
        if let Some(hook) = hook {
            hook(&self.manager());
        }
        true
    }

    fn disconnected(self: &Arc<Self>, reconnect: bool) {
        let (pending, hook) = {
            let mut state = self.state.lock();
            state.outbound = None;
            let pending: Vec<PendingRequest> = state.pending.drain().map(|(_, p)| p).collect();
            (pending, state.hooks.on_close.clone())
        };
        if reconnect {
            self.set_phase(ConnectionState::Reconnecting);
        }
        // Nothing answers these; dropping them is all that happens.
        info!(abandoned = pending.len(), reconnect, "connection closed");
        for request in pending {
            request.complete(Err(ResponseError::Abandoned));
        }
        if let Some(hook) = hook {
            hook(&self.manager());
        }
    }

    fn expire(&self, generation: u64, seq: u64) {
        let request = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.pending.remove(&seq)
        };
        if let Some(request) = request {
            warn!(seq, "request timed out");
            request.complete(Err(ResponseError::TimedOut));
        }
    }

    fn settle(&self, seq: u64, outcome: Outcome) {
        let request = self.state.lock().pending.remove(&seq);
        match request {
            Some(request) => request.complete(outcome),
            None => debug!(seq, "response for unknown request"),
        }
    }

    fn handle_frame(self: &Arc<Self>, frame: &str) {
        let message = match WireMessage::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                return;
            }
        };

        if let Some(seqs) = message.no_resp_for() {
            for seq in seqs {
                self.settle(seq, Ok(Reply::Empty));
            }
        }

        let replies = self.route(&message);

        if let Some(seqs) = message.resp_for() {
            let outcome = if message.is_error() {
                Err(ResponseError::Rejected(message.clone()))
            } else {
                Ok(replies
                    .into_iter()
                    .find(|reply| !reply.is_empty())
                    .unwrap_or_else(|| Reply::Message(message.clone())))
            };
            for seq in seqs {
                self.settle(seq, outcome.clone());
            }
        }
    }

    fn route(self: &Arc<Self>, message: &WireMessage) -> Vec<Reply> {
        let Some(sync_type) = message.sync_type() else {
            debug!("message without _sync_type");
            return Vec::new();
        };
        let receivers: Vec<Receiver> = self
            .state
            .lock()
            .receivers
            .get(sync_type)
            .map(|list| list.iter().map(|(_, r)| Arc::clone(r)).collect())
            .unwrap_or_default();
        if receivers.is_empty() {
            debug!(sync_type, "no receiver registered");
            return Vec::new();
        }

        let cx = ReceiveContext {
            manager: self.manager(),
        };
        receivers
            .iter()
            .filter_map(|receiver| {
                match panic::catch_unwind(AssertUnwindSafe(|| receiver(message, &cx))) {
                    Ok(Ok(reply)) => Some(reply),
                    Ok(Err(e)) => {
                        warn!(sync_type, error = ?e, "receiver failed");
                        None
                    }
                    Err(payload) => {
                        warn!(sync_type, panic = panic_message(payload.as_ref()), "receiver panicked");
                        None
                    }
                }
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}

async fn shutdown_requested(phase: &mut watch::Receiver<ConnectionState>) {
    let _ = phase
        .wait_for(|s| *s == ConnectionState::Shutdown)
        .await;
}

async fn run(weak: Weak<Inner>, mut phase: watch::Receiver<ConnectionState>) {
    let Some(mut backoff) = weak
        .upgrade()
        .map(|inner| Backoff::new(inner.config.backoff.clone()))
    else {
        return;
    };

    loop {
        let Some((url, connector)) = weak.upgrade().and_then(|inner| inner.begin_attempt()) else {
            break;
        };

        let attempt = tokio::select! {
            result = connector.connect(&url) => result,
            _ = shutdown_requested(&mut phase) => break,
        };

        match attempt {
            Ok(connection) => {
                if !serve(&weak, connection, &mut backoff, &mut phase).await {
                    break;
                }
            }
            Err(e) => match weak.upgrade() {
                Some(inner) => inner.connection_setup_failed(&e),
                None => break,
            },
        }

        let delay = backoff.next_delay();
        debug!(?delay, "waiting before reconnect");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_requested(&mut phase) => break,
        }
    }

    debug!("connection task finished");
}

/// Drive one open connection. Returns whether to reconnect.
async fn serve(
    weak: &Weak<Inner>,
    mut connection: Box<dyn Connection>,
    backoff: &mut Backoff,
    phase: &mut watch::Receiver<ConnectionState>,
) -> bool {
    let (tx, mut outbound) = mpsc::unbounded_channel();
    let opened = weak.upgrade().map(|inner| inner.opened(tx)).unwrap_or(false);
    if !opened {
        let _ = connection.close().await;
        return false;
    }

    // Backoff resets once the connection has stayed open for one interval.
    let stable = tokio::time::sleep(backoff.current());
    tokio::pin!(stable);
    let mut stable_reached = false;

    let reconnect = loop {
        tokio::select! {
            biased;

            _ = shutdown_requested(phase) => break false,

            _ = &mut stable, if !stable_reached => {
                stable_reached = true;
                backoff.reset();
            }

            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = connection.send(frame).await {
                        warn!(error = %e, "send failed");
                        break true;
                    }
                }
                None => break false,
            },

            frame = connection.recv() => match frame {
                Ok(Some(frame)) => match weak.upgrade() {
                    Some(inner) => inner.handle_frame(&frame),
                    None => break false,
                },
                Ok(None) => {
                    info!("server closed the connection");
                    break true;
                }
                Err(e) => {
                    warn!(error = %e, "receive failed");
                    break true;
                }
            },
        }
    };

    if let Err(e) = connection.close().await {
        debug!(error = %e, "error while closing connection");
    }
    if let Some(inner) = weak.upgrade() {
        inner.disconnected(reconnect);
    }
    reconnect
}
