//! Per-connection session context.
//!
//! A session is created from the WebSocket handshake query and lives until
//! the socket closes. There is no resume: a reconnect is a new session.

use serde::Deserialize;
use uuid::Uuid;

/// Room and user used when the handshake omits them.
pub const DEFAULT_ID: &str = "default";

/// Unique identifier of one live connection.
pub type ConnectionId = Uuid;

/// Allocates a fresh, time-ordered connection id.
#[must_use]
pub fn new_connection_id() -> ConnectionId {
    Uuid::now_v7()
}

/// Query parameters of `GET /ws`.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeParams {
    /// Project the connection belongs to.
    pub project_id: Option<String>,
    /// User opening the connection.
    pub user_id: Option<String>,
}

/// Identity and room of a connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Connection id.
    pub id: ConnectionId,
    /// Room key, derived from the project id.
    pub room: String,
    /// User id from the handshake.
    pub user_id: String,
}

impl Session {
    /// Derives a session from handshake parameters. Missing or empty values
    /// fall back to [`DEFAULT_ID`].
    #[must_use]
    pub fn from_handshake(params: &HandshakeParams) -> Self {
        Self {
            id: new_connection_id(),
            room: or_default(params.project_id.as_deref()),
            user_id: or_default(params.user_id.as_deref()),
        }
    }
}

fn or_default(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => DEFAULT_ID.to_string(),
    }
}
