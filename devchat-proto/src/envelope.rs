//! The AI reply envelope.
//!
//! Every AI-origin message carries a JSON-encoded [`AiReplyEnvelope`] in its
//! `message` field. [`normalize`] turns arbitrary model output into a string
//! that always decodes as an envelope.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Text of the envelope sent when an AI request fails before producing
/// its own error envelope.
pub const FALLBACK_TEXT: &str = "Sorry, I encountered an error. Please try again.";

/// Normalized AI reply: display text plus an optional generated file tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiReplyEnvelope {
    /// Markdown text shown in the chat.
    pub text: String,
    /// Generated files keyed by path. Node values are kept as raw JSON so
    /// nested `file`/`directory` shapes pass through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_tree: Option<BTreeMap<String, serde_json::Value>>,
}

impl AiReplyEnvelope {
    /// Creates a text-only envelope.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            file_tree: None,
        }
    }

    /// Envelope reporting an AI failure to the room.
    #[must_use]
    pub fn error(reason: impl std::fmt::Display) -> Self {
        Self::text(format!("AI Error: {reason}"))
    }

    /// The fixed fallback envelope.
    #[must_use]
    pub fn fallback() -> Self {
        Self::text(FALLBACK_TEXT)
    }

    /// Encodes the envelope as a JSON string.
    #[must_use]
    pub fn to_json(&self) -> String {
        // A struct of strings and JSON values always serializes.
        serde_json::to_string(self).unwrap_or_else(|_| String::from(r#"{"text":""}"#))
    }

    /// Decodes an envelope from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if `json` is not an envelope.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Normalizes raw model output into an envelope JSON string.
///
/// Output that already decodes as an envelope is returned unchanged;
/// anything else becomes `{"text": <raw>}`.
#[must_use]
pub fn normalize(raw: &str) -> String {
    if AiReplyEnvelope::from_json(raw).is_ok() {
        raw.to_string()
    } else {
        AiReplyEnvelope::text(raw).to_json()
    }
}
