//! Room membership registry for the relay server.
//!
//! A room is the set of live connections that joined with the same project
//! identifier. Rooms come into existence on first join and are removed as
//! soon as their last member leaves.
//!
//! Room entries are ephemeral, lost on relay restart.

use std::collections::HashMap;

use axum::extract::ws::Message;
use tokio::sync::{RwLock, mpsc};

use crate::session::ConnectionId;

/// Channel feeding one connection's WebSocket writer task.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// In-memory map from room key to its members.
///
/// Thread-safe via [`RwLock`].
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, HashMap<ConnectionId, ConnectionSender>>>,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    /// Creates a new, empty room registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a connection to a room, creating the room if needed.
    ///
    /// Returns the room's member count after joining.
    pub async fn join(&self, room: &str, conn_id: ConnectionId, sender: ConnectionSender) -> usize {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room.to_string()).or_default();
        members.insert(conn_id, sender);
        members.len()
    }

    /// Removes a connection from a room, dropping the room once empty.
    ///
    /// Returns `true` if the connection was a member.
    pub async fn leave(&self, room: &str, conn_id: ConnectionId) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(members) = rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(&conn_id).is_some();
        if members.is_empty() {
            rooms.remove(room);
            tracing::debug!(room = %room, "room emptied and removed");
        }
        removed
    }

    /// Sends a text frame to every member of `room` except `except`.
    ///
    /// Returns the number of members the frame was handed to. Delivery is
    /// at most once; members whose writer has gone away are skipped.
    pub async fn broadcast(&self, room: &str, text: &str, except: Option<ConnectionId>) -> usize {
        let rooms = self.rooms.read().await;
        let Some(members) = rooms.get(room) else {
            return 0;
        };
        members
            .iter()
            .filter(|(id, _)| Some(**id) != except)
            .filter(|(_, sender)| sender.send(Message::Text(text.into())).is_ok())
            .count()
    }

    /// Returns the number of members in a room (0 if it does not exist).
    pub async fn member_count(&self, room: &str) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(room).map_or(0, HashMap::len)
    }

    /// Returns the number of non-empty rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
