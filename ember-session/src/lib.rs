//! # ember-session — realtime client for ephemeral chat rooms
//!
//! Anonymous participants join a short-lived, auto-expiring room and
//! exchange messages over a persistent WebSocket connection. This crate
//! is the client side of that conversation: it owns one connection per
//! room, survives network interruptions transparently, and folds the
//! raw inbound event stream into a duplicate-free, correctly ordered
//! transcript.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   open/close/send   ┌─────────────┐
//! │ UI / caller │ ◄─────────────────► │ RoomSession │
//! └─────────────┘    SessionEvents    └──────┬──────┘
//!                                            │
//!                      ┌─────────────────────┼──────────────────┐
//!                      ▼                     ▼                  ▼
//!               ┌─────────────┐       ┌────────────┐     ┌────────────┐
//!               │ RoomRegistry│       │ WebSocket  │     │ Transcript │
//!               │ (preflight) │       │ /ws/{room} │ ──► │ (dedup)    │
//!               └─────────────┘       └────────────┘     └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — JSON wire envelope (closed tagged union)
//! - [`transcript`] — event stream processor: snapshot replacement,
//!   message dedup, presence coalescing
//! - [`session`] — connection lifecycle: open/close/send with automatic
//!   reconnection and terminal room-gone handling
//! - [`backoff`] — capped exponential reconnect delays with jitter
//! - [`registry`] — room registry collaborator (create/fetch, expiry)

pub mod backoff;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transcript;

// Re-exports for convenience
pub use backoff::ReconnectPolicy;
pub use protocol::{Outbound, ProtocolError, RoomEvent, ServerEvent};
pub use registry::{RegistryError, RoomInfo, RoomRegistry};
pub use session::{
    ConnectionState, RoomGone, RoomSession, SendError, SessionConfig, SessionEvent,
};
pub use transcript::{Ingest, Transcript, PRESENCE_ECHO_WINDOW_MS};
