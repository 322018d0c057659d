//! Chat message types for the `DevChat` `project-message` event.
//!
//! A [`ChatMessage`] is the payload every participant sends and receives.
//! Senders are modelled as a [`Participant`] enum; the synthetic AI sender
//! only exists as a sentinel string at the JSON boundary.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Wire identifier of the synthetic AI participant.
pub const AI_SENDER_ID: &str = "ai";

/// Wire display label of the synthetic AI participant.
pub const AI_SENDER_LABEL: &str = "AI";

/// Placeholder text carried by audio messages.
pub const VOICE_MESSAGE_TEXT: &str = "[voice message]";

/// Errors raised when validating an inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    /// A client tried to send a message as the AI participant.
    #[error("sender identity is reserved for the AI participant")]
    ReservedSender,
    /// An audio message carried no `audio` payload.
    #[error("audio message is missing its audio payload")]
    MissingAudio,
    /// The `audio` payload is not valid base64.
    #[error("audio payload is not valid base64: {0}")]
    InvalidAudio(String),
}

/// The author of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "WireParticipant", into = "WireParticipant")]
pub enum Participant {
    /// A connected user.
    Human {
        /// User identifier.
        id: String,
        /// Email-like display label.
        email: String,
    },
    /// The synthetic AI participant.
    Ai,
}

impl Participant {
    /// Creates a human participant.
    #[must_use]
    pub fn human(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self::Human {
            id: id.into(),
            email: email.into(),
        }
    }

    /// Returns the wire identifier of this participant.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Human { id, .. } => id,
            Self::Ai => AI_SENDER_ID,
        }
    }

    /// Returns the display label of this participant.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Human { email, .. } => email,
            Self::Ai => AI_SENDER_LABEL,
        }
    }

    /// Returns `true` for the synthetic AI participant.
    #[must_use]
    pub const fn is_ai(&self) -> bool {
        matches!(self, Self::Ai)
    }
}

/// JSON shape of a sender: `{ "id": ..., "email": ... }`.
///
/// `_id` is accepted on input for older clients.
#[derive(Serialize, Deserialize)]
struct WireParticipant {
    #[serde(alias = "_id")]
    id: String,
    #[serde(default)]
    email: String,
}

impl From<WireParticipant> for Participant {
    fn from(wire: WireParticipant) -> Self {
        if wire.id == AI_SENDER_ID {
            Self::Ai
        } else {
            Self::Human {
                id: wire.id,
                email: wire.email,
            }
        }
    }
}

impl From<Participant> for WireParticipant {
    fn from(participant: Participant) -> Self {
        match participant {
            Participant::Human { id, email } => Self { id, email },
            Participant::Ai => Self {
                id: AI_SENDER_ID.to_string(),
                email: AI_SENDER_LABEL.to_string(),
            },
        }
    }
}

/// Kind of content a chat message carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text (the default when `messageType` is absent).
    #[default]
    Text,
    /// Recorded audio, carried as base64 in the `audio` field.
    Audio,
}

/// Payload of a `project-message` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message text. For AI-origin messages this is a JSON-encoded
    /// [`crate::envelope::AiReplyEnvelope`].
    #[serde(default)]
    pub message: String,
    /// Who sent the message.
    pub sender: Participant,
    /// Content kind; absent means text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageKind>,
    /// Base64 audio blob (optionally a `data:` URL) for audio messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

impl ChatMessage {
    /// Creates a text message.
    #[must_use]
    pub fn text(sender: Participant, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sender,
            message_type: Some(MessageKind::Text),
            audio: None,
        }
    }

    /// Creates an audio message carrying a base64 payload.
    #[must_use]
    pub fn audio(sender: Participant, audio: impl Into<String>) -> Self {
        Self {
            message: VOICE_MESSAGE_TEXT.to_string(),
            sender,
            message_type: Some(MessageKind::Audio),
            audio: Some(audio.into()),
        }
    }

    /// Creates an AI-origin message around an already-encoded envelope.
    #[must_use]
    pub fn from_ai(envelope_json: impl Into<String>) -> Self {
        Self {
            message: envelope_json.into(),
            sender: Participant::Ai,
            message_type: None,
            audio: None,
        }
    }

    /// Returns the content kind, defaulting to [`MessageKind::Text`].
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.message_type.unwrap_or_default()
    }

    /// Returns `true` if the message text contains `trigger`.
    #[must_use]
    pub fn mentions(&self, trigger: &str) -> bool {
        !trigger.is_empty() && self.message.contains(trigger)
    }

    /// Returns the message text with the first occurrence of `trigger` removed.
    #[must_use]
    pub fn strip_trigger(&self, trigger: &str) -> String {
        self.message.replacen(trigger, "", 1)
    }

    /// Checks that a message received from a client is acceptable to relay.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::ReservedSender`] if the client claims to be
    /// the AI, or an audio error if an audio payload is missing or malformed.
    pub fn validate_inbound(&self) -> Result<(), MessageError> {
        if self.sender.is_ai() {
            return Err(MessageError::ReservedSender);
        }
        if self.kind() == MessageKind::Audio {
            let audio = self.audio.as_deref().ok_or(MessageError::MissingAudio)?;
            decode_audio(audio)?;
        }
        Ok(())
    }
}

/// Decodes an audio payload, accepting a bare base64 string or a
/// `data:<mime>;base64,<payload>` URL.
///
/// # Errors
///
/// Returns [`MessageError::InvalidAudio`] if the payload is not base64.
pub fn decode_audio(audio: &str) -> Result<Vec<u8>, MessageError> {
    let payload = match audio.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, data)| data)
            .ok_or_else(|| MessageError::InvalidAudio("data URL is not base64".to_string()))?,
        None => audio,
    };
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| MessageError::InvalidAudio(e.to_string()))
}
