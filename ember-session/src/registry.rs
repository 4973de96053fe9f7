//! Room registry client.
//!
//! The registry is the request/response collaborator that mints rooms
//! and answers whether one is still alive. Rooms are ephemeral: the
//! server generates a short id and a 24-hour expiry at creation, and a
//! missing room and an expired room are distinct, non-retrying
//! conditions — a session must not spin its reconnect loop against a
//! room that will never come back.

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Room metadata returned by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

impl RoomInfo {
    /// Whether the room's lifetime is already over.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Time left before the room expires. Negative once expired —
    /// countdown rendering is the caller's concern.
    pub fn time_remaining(&self) -> TimeDelta {
        self.expires_at - Utc::now()
    }
}

/// Registry errors.
#[derive(Debug)]
pub enum RegistryError {
    /// No room with this id exists.
    NotFound(String),
    /// The room existed but its lifetime is over.
    Expired(String),
    /// Unexpected HTTP status.
    Http(u16),
    /// Network-level failure reaching the registry.
    Transport(String),
    /// Response body did not match the registry schema.
    Decode(String),
}

impl RegistryError {
    /// Conditions that must end a session rather than be retried.
    pub fn is_room_gone(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Expired(_))
    }
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "room '{id}' not found"),
            Self::Expired(id) => write!(f, "room '{id}' has expired"),
            Self::Http(status) => write!(f, "registry returned status {status}"),
            Self::Transport(e) => write!(f, "registry unreachable: {e}"),
            Self::Decode(e) => write!(f, "registry response malformed: {e}"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// HTTP client for the room registry.
pub struct RoomRegistry {
    http: reqwest::Client,
    base_url: String,
}

impl RoomRegistry {
    /// Create a client for a registry at `base_url`, e.g. `http://127.0.0.1:8000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// `POST /api/rooms/` — the server picks the id and the expiry.
    pub async fn create_room(&self) -> Result<RoomInfo, RegistryError> {
        let url = format!("{}/api/rooms/", self.base_url);
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| RegistryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Http(status.as_u16()));
        }
        response
            .json::<RoomInfo>()
            .await
            .map_err(|e| RegistryError::Decode(e.to_string()))
    }

    /// `GET /api/rooms/{id}` — 404 means the room never existed, 410
    /// means it existed and expired.
    pub async fn fetch_room(&self, room_id: &str) -> Result<RoomInfo, RegistryError> {
        let url = format!("{}/api/rooms/{}", self.base_url, room_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| RegistryError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(room_id.to_string()));
        }
        if status == StatusCode::GONE {
            return Err(RegistryError::Expired(room_id.to_string()));
        }
        if !status.is_success() {
            return Err(RegistryError::Http(status.as_u16()));
        }
        response
            .json::<RoomInfo>()
            .await
            .map_err(|e| RegistryError::Decode(e.to_string()))
    }
}
