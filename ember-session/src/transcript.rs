//! Event stream processor: folds the inbound event stream into an
//! ordered, duplicate-free transcript plus the session's assigned
//! identity.
//!
//! ```text
//! ServerEvent (arrival order)
//!       │
//!       ▼
//! Transcript::ingest()
//!       │── MessageHistory ─► replace everything, set identity
//!       │── Message ────────► append unless id already held
//!       │── UserJoined/Left ► append unless echo of the previous entry
//!       ▼
//! events() / identity()
//! ```
//!
//! The server is the ordering authority: entries arrive monotonically
//! non-decreasing by server timestamp and are never reordered here, only
//! filtered. Chat messages get exact id-based dedup (the whole held log
//! is scanned; one session's worth of messages stays small). Presence
//! events get a proximity filter against the immediately preceding entry
//! only.

use std::mem::discriminant;

use crate::protocol::{RoomEvent, ServerEvent};

/// Window within which a repeated join/leave for the same user is
/// treated as an echo of the entry right before it.
pub const PRESENCE_ECHO_WINDOW_MS: i64 = 1_000;

/// Outcome of feeding one inbound event to the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// Snapshot applied: history replaced wholesale, identity assigned.
    Replaced,
    /// Event appended to the transcript.
    Appended,
    /// Chat message dropped: an entry with the same id is already held.
    DuplicateMessage,
    /// Presence event dropped: echo of the immediately preceding entry.
    CoalescedPresence,
}

/// One session's view of a room: ordered events plus local identity.
#[derive(Debug, Default)]
pub struct Transcript {
    events: Vec<RoomEvent>,
    identity: Option<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one inbound event, in arrival order.
    ///
    /// Callers must not interleave calls for the same room; the session
    /// drives this from a single read loop.
    pub fn ingest(&mut self, event: ServerEvent) -> Ingest {
        match event {
            ServerEvent::MessageHistory { username, messages } => {
                // Full-state reset, not a merge. Once per connection epoch.
                self.events = messages;
                self.identity = Some(username);
                Ingest::Replaced
            }
            ServerEvent::Message {
                id,
                username,
                contents,
                timestamp,
            } => {
                if self.contains_message(&id) {
                    return Ingest::DuplicateMessage;
                }
                self.events.push(RoomEvent::Message {
                    id,
                    username,
                    contents,
                    timestamp,
                });
                Ingest::Appended
            }
            ServerEvent::UserJoined { username, timestamp } => {
                self.push_presence(RoomEvent::UserJoined { username, timestamp })
            }
            ServerEvent::UserLeft { username, timestamp } => {
                self.push_presence(RoomEvent::UserLeft { username, timestamp })
            }
        }
    }

    /// Ordered events currently held.
    pub fn events(&self) -> &[RoomEvent] {
        &self.events
    }

    /// Username assigned by the server for the current connection epoch.
    /// `None` until the first snapshot arrives.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn contains_message(&self, id: &str) -> bool {
        self.events.iter().any(|e| e.message_id() == Some(id))
    }

    /// Append a join/leave unless it echoes the entry right before it.
    /// Only the last entry is checked — a proximity filter, not an index.
    fn push_presence(&mut self, event: RoomEvent) -> Ingest {
        if let Some(last) = self.events.last() {
            let same_kind = discriminant(last) == discriminant(&event);
            if same_kind
                && last.username() == event.username()
                && (event.timestamp() - last.timestamp())
                    .num_milliseconds()
                    .abs()
                    < PRESENCE_ECHO_WINDOW_MS
            {
                return Ingest::CoalescedPresence;
            }
        }
        self.events.push(event);
        Ingest::Appended
    }
}
