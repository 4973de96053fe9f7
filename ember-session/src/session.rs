//! Connection lifecycle for one room session.
//!
//! A [`RoomSession`] owns exactly one logical connection to a room's
//! event endpoint and recovers from failures transparently:
//!
//! ```text
//! open() ──► Connecting ──► Connected ──► Disconnected
//!               ▲                              │
//!               └───── backoff delay ──────────┘
//! ```
//!
//! Every close, graceful or abrupt, takes the same recovery path; retry
//! is indefinite. The two exceptions end the session for good: an
//! explicit [`RoomSession::close`], which supersedes any state and
//! cancels a pending reconnect before it can fire, and a room that no
//! longer exists, which the server signals with a policy close (and the
//! registry with 404/410) and which must render as a terminal state
//! rather than a spinner.
//!
//! The socket is created and dropped inside a single supervisor task;
//! no other component touches it. `open` and `close` are idempotent
//! under rapid re-entrant calls from UI re-mounts.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::backoff::ReconnectPolicy;
use crate::protocol::{Outbound, RoomEvent, ServerEvent};
use crate::registry::{RegistryError, RoomRegistry};
use crate::transcript::{Ingest, Transcript};

/// Outbound frames buffered between `send()` and the socket.
const OUTBOUND_BUFFER: usize = 64;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// Why a room is permanently unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomGone {
    /// No room with this id exists.
    NotFound,
    /// The room existed and its lifetime is over.
    Expired,
}

/// Local send failure. Messages typed while disconnected are dropped,
/// not buffered — the domain is ephemeral and there is no durable
/// delivery guarantee to begin with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    NotConnected,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
        }
    }
}

impl std::error::Error for SendError {}

/// Events emitted to the owner of the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Transport established; a history snapshot follows.
    Connected,
    /// Transport lost; a reconnect is scheduled unless the session was
    /// closed. `error` is advisory, for display only.
    Disconnected { error: Option<String> },
    /// Snapshot applied: transcript replaced, identity assigned for
    /// this connection epoch.
    Synced { identity: String },
    /// A new transcript entry.
    Appended(RoomEvent),
    /// Terminal: the room no longer accepts connections; retrying has
    /// stopped.
    RoomGone(RoomGone),
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket base, e.g. `ws://127.0.0.1:8000`. The room endpoint is
    /// `{ws_url}/ws/{room_id}`.
    pub ws_url: String,
    /// Registry base for the room preflight check; `None` skips it and
    /// connects straight away.
    pub registry_url: Option<String>,
    /// Delay policy between reconnect attempts.
    pub reconnect: ReconnectPolicy,
    /// Capacity of the session event channel.
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:8000".to_string(),
            registry_url: None,
            reconnect: ReconnectPolicy::default(),
            event_buffer: 256,
        }
    }
}

/// One client's participation in a room, spanning possibly many
/// connection epochs.
pub struct RoomSession {
    room_id: String,
    config: SessionConfig,
    state: Arc<RwLock<ConnectionState>>,
    transcript: Arc<RwLock<Transcript>>,
    outgoing: Arc<RwLock<Option<mpsc::Sender<Outbound>>>>,
    event_tx: mpsc::Sender<SessionEvent>,
    event_rx: Option<mpsc::Receiver<SessionEvent>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    supervisor: Option<JoinHandle<()>>,
}

impl RoomSession {
    /// Create a session for `room_id`. Nothing connects until [`open`].
    ///
    /// [`open`]: RoomSession::open
    pub fn new(room_id: impl Into<String>, config: SessionConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        Self {
            room_id: room_id.into(),
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            transcript: Arc::new(RwLock::new(Transcript::new())),
            outgoing: Arc::new(RwLock::new(None)),
            event_tx,
            event_rx: Some(event_rx),
            shutdown_tx: None,
            supervisor: None,
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.event_rx.take()
    }

    /// Establish the room connection.
    ///
    /// No-op while a connection is already opening or open, so overlapping
    /// triggers (UI re-mounts, rapid re-renders) never produce a second
    /// socket.
    pub fn open(&mut self) {
        if self.is_open() {
            log::debug!("room {}: open is a no-op, supervisor running", self.room_id);
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        let supervisor = Supervisor {
            room_id: self.room_id.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
            transcript: self.transcript.clone(),
            outgoing: self.outgoing.clone(),
            event_tx: self.event_tx.clone(),
            shutdown: shutdown_rx,
        };
        self.supervisor = Some(tokio::spawn(supervisor.run()));
    }

    /// Tear the session down: cancel any pending reconnect and close the
    /// active connection, if any. Safe to call with nothing open.
    pub async fn close(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.supervisor.take() {
            let _ = handle.await;
        }
        *self.state.write().await = ConnectionState::Disconnected;
    }

    /// Send a chat message. Fails locally unless connected; nothing is
    /// queued or retried.
    pub async fn send(&self, contents: impl Into<String>) -> Result<(), SendError> {
        if *self.state.read().await != ConnectionState::Connected {
            return Err(SendError::NotConnected);
        }
        let outgoing = self
            .outgoing
            .read()
            .await
            .clone()
            .ok_or(SendError::NotConnected)?;
        outgoing
            .send(Outbound::new(contents))
            .await
            .map_err(|_| SendError::NotConnected)
    }

    /// Whether a supervisor task currently owns a connection attempt.
    pub fn is_open(&self) -> bool {
        self.supervisor
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Snapshot of the transcript's ordered events.
    pub async fn events(&self) -> Vec<RoomEvent> {
        self.transcript.read().await.events().to_vec()
    }

    /// Username assigned by the server for the current epoch.
    pub async fn identity(&self) -> Option<String> {
        self.transcript.read().await.identity().map(str::to_string)
    }

    /// Room this session belongs to.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }
}

/// How one connection epoch ended.
enum EpochEnd {
    /// Transport failure or close; retry after a delay.
    Retry(Option<String>),
    /// The server refused the room; stop for good.
    Gone(RoomGone),
    /// `close()` was observed; stop silently.
    Shutdown,
}

/// The task that owns the connection. Exactly one per open session.
struct Supervisor {
    room_id: String,
    config: SessionConfig,
    state: Arc<RwLock<ConnectionState>>,
    transcript: Arc<RwLock<Transcript>>,
    outgoing: Arc<RwLock<Option<mpsc::Sender<Outbound>>>>,
    event_tx: mpsc::Sender<SessionEvent>,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    async fn run(self) {
        let Supervisor {
            room_id,
            config,
            state,
            transcript,
            outgoing,
            event_tx,
            mut shutdown,
        } = self;

        let endpoint = format!("{}/ws/{}", config.ws_url.trim_end_matches('/'), room_id);
        let mut policy = config.reconnect.clone();

        // The registry distinguishes "never existed" from "expired"
        // before we spend a connect attempt on either.
        if let Some(base) = config.registry_url.as_deref() {
            *state.write().await = ConnectionState::Connecting;
            let registry = RoomRegistry::new(base);
            let preflight = tokio::select! {
                res = registry.fetch_room(&room_id) => res,
                _ = shutdown.changed() => return,
            };
            match preflight {
                Ok(room) => log::info!(
                    "room {room_id}: alive, {}s remaining",
                    room.time_remaining().num_seconds()
                ),
                Err(err) if err.is_room_gone() => {
                    let reason = match err {
                        RegistryError::Expired(_) => RoomGone::Expired,
                        _ => RoomGone::NotFound,
                    };
                    *state.write().await = ConnectionState::Disconnected;
                    notify(&event_tx, SessionEvent::RoomGone(reason));
                    return;
                }
                Err(err) => {
                    log::warn!("room {room_id}: registry preflight failed, connecting anyway: {err}")
                }
            }
        }

        loop {
            if *shutdown.borrow() || shutdown.has_changed().is_err() {
                break;
            }

            *state.write().await = ConnectionState::Connecting;
            let outcome = run_epoch(
                &room_id,
                &endpoint,
                &state,
                &transcript,
                &outgoing,
                &event_tx,
                &mut policy,
                &mut shutdown,
            )
            .await;

            outgoing.write().await.take();
            *state.write().await = ConnectionState::Disconnected;

            match outcome {
                EpochEnd::Shutdown => break,
                EpochEnd::Gone(reason) => {
                    log::info!("room {room_id}: gone ({reason:?}), retrying stopped");
                    notify(&event_tx, SessionEvent::RoomGone(reason));
                    break;
                }
                EpochEnd::Retry(error) => {
                    notify(&event_tx, SessionEvent::Disconnected { error });
                    let delay = policy.next_delay();
                    log::info!("room {room_id}: disconnected, reconnecting in {delay:?}");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        res = shutdown.changed() => {
                            if res.is_err() {
                                break;
                            }
                        }
                    }
                    // Desired state is re-checked at the top of the loop:
                    // a close() racing the timer must win.
                }
            }
        }
    }
}

/// Run one connection epoch: connect, pump frames, report how it ended.
#[allow(clippy::too_many_arguments)]
async fn run_epoch(
    room_id: &str,
    endpoint: &str,
    state: &Arc<RwLock<ConnectionState>>,
    transcript: &Arc<RwLock<Transcript>>,
    outgoing: &Arc<RwLock<Option<mpsc::Sender<Outbound>>>>,
    event_tx: &mpsc::Sender<SessionEvent>,
    policy: &mut ReconnectPolicy,
    shutdown: &mut watch::Receiver<bool>,
) -> EpochEnd {
    log::debug!("room {room_id}: connecting to {endpoint}");

    let (ws, _) = tokio::select! {
        res = tokio_tungstenite::connect_async(endpoint) => match res {
            Ok(pair) => pair,
            Err(err) => return EpochEnd::Retry(Some(format!("connect failed: {err}"))),
        },
        _ = shutdown.changed() => return EpochEnd::Shutdown,
    };

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(OUTBOUND_BUFFER);
    *outgoing.write().await = Some(out_tx);
    *state.write().await = ConnectionState::Connected;
    policy.reset();
    notify(event_tx, SessionEvent::Connected);
    log::info!("room {room_id}: connected");

    loop {
        tokio::select! {
            maybe_out = out_rx.recv() => match maybe_out {
                Some(payload) => match payload.encode() {
                    Ok(raw) => {
                        if let Err(err) = ws_tx.send(Message::Text(raw.into())).await {
                            return EpochEnd::Retry(Some(format!("send failed: {err}")));
                        }
                    }
                    Err(err) => log::warn!("room {room_id}: dropping outbound frame: {err}"),
                },
                // The slot in `outgoing` keeps the sender alive for the
                // whole epoch; a closed channel means teardown raced us.
                None => return EpochEnd::Retry(None),
            },
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(raw))) => {
                    ingest_frame(transcript, event_tx, raw.as_str()).await;
                }
                Some(Ok(Message::Close(close))) => {
                    if let Some(reason) = room_gone_reason(close.as_ref()) {
                        return EpochEnd::Gone(reason);
                    }
                    return EpochEnd::Retry(None);
                }
                // Ping/pong are answered by the transport; binary frames
                // are not part of this protocol.
                Some(Ok(_)) => {}
                Some(Err(err)) => return EpochEnd::Retry(Some(format!("transport error: {err}"))),
                None => return EpochEnd::Retry(None),
            },
            _ = shutdown.changed() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                return EpochEnd::Shutdown;
            }
        }
    }
}

/// Decode and fold one inbound frame into the transcript.
///
/// A frame that fails to decode is discarded; processing of subsequent
/// frames continues.
async fn ingest_frame(
    transcript: &Arc<RwLock<Transcript>>,
    event_tx: &mpsc::Sender<SessionEvent>,
    raw: &str,
) {
    let event = match ServerEvent::decode(raw) {
        Ok(event) => event,
        Err(err) => {
            log::warn!("discarding undecodable frame: {err}");
            return;
        }
    };

    let mut held = transcript.write().await;
    match held.ingest(event) {
        Ingest::Replaced => {
            let identity = held.identity().unwrap_or("").to_string();
            drop(held);
            notify(event_tx, SessionEvent::Synced { identity });
        }
        Ingest::Appended => {
            let appended = held.events().last().cloned();
            drop(held);
            if let Some(event) = appended {
                notify(event_tx, SessionEvent::Appended(event));
            }
        }
        Ingest::DuplicateMessage => log::debug!("dropped replayed message"),
        Ingest::CoalescedPresence => log::debug!("coalesced presence echo"),
    }
}

/// Deliver a session event without ever blocking the supervisor.
///
/// The transcript accessors stay authoritative; if the owner stops
/// draining the channel, notifications are dropped rather than letting
/// UI backpressure stall the connection.
fn notify(event_tx: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    if let Err(mpsc::error::TrySendError::Full(event)) = event_tx.try_send(event) {
        log::debug!("event channel full, dropping {event:?}");
    }
}

/// Map a policy-violation close to the room-gone reason it encodes.
///
/// The server rejects a dead room by closing with code 1008 and a
/// human-readable reason ("Room not found" / "Room expired"). Any other
/// close is a transient condition.
fn room_gone_reason(close: Option<&CloseFrame>) -> Option<RoomGone> {
    let frame = close?;
    if frame.code != CloseCode::Policy {
        return None;
    }
    if frame.reason.as_str().to_ascii_lowercase().contains("expired") {
        Some(RoomGone::Expired)
    } else {
        Some(RoomGone::NotFound)
    }
}
