//! Event frames exchanged over the `DevChat` WebSocket.
//!
//! Each WebSocket text frame carries one JSON [`Event`] of the form
//! `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};

use crate::message::ChatMessage;

/// Event name of chat messages.
pub const PROJECT_MESSAGE: &str = "project-message";

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The frame is not a known event.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// A named event and its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Event {
    /// A chat message for the sender's project room.
    #[serde(rename = "project-message")]
    ProjectMessage(ChatMessage),
    /// Server-to-client rejection of the client's last frame.
    #[serde(rename = "error")]
    Error {
        /// Human-readable error description.
        reason: String,
    },
}

impl Event {
    /// Builds an error event.
    #[must_use]
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }
}

/// Encodes an [`Event`] as a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the event cannot be serialized.
pub fn encode(event: &Event) -> Result<String, CodecError> {
    serde_json::to_string(event).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes an [`Event`] from a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::InvalidFrame` if the text is not a known event.
pub fn decode(text: &str) -> Result<Event, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::InvalidFrame(e.to_string()))
}
