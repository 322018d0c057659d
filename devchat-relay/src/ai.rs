//! AI client adapter.
//!
//! [`AiClient`] turns a prompt into a JSON-encoded
//! [`AiReplyEnvelope`](devchat_proto::envelope::AiReplyEnvelope). It never
//! fails from the caller's point of view: upstream errors and a missing API
//! key are reported inside the envelope text, and non-envelope model output
//! is wrapped by [`envelope::normalize`].
//!
//! The model behind the client is a [`GenerativeModel`]. In production it is
//! a [`GeminiModel`] built lazily on first use; tests inject their own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use devchat_proto::envelope::{self, AiReplyEnvelope};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-1.5-flash-latest";
const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are an expert AI assistant for developers, coders, and programmers. Always reply in strict JSON matching {\"text\": string, \"fileTree\"?: object}. Keep answers concise but accurate.";

/// Errors produced while talking to the generative model.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    /// No API key was configured.
    #[error("GOOGLE_AI_KEY is not set in environment")]
    MissingCredential,
    /// The HTTP request could not be completed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The API answered with a non-success status.
    #[error("upstream returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
    /// The API answered with a body we could not use.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Settings for the generative model.
#[derive(Clone)]
pub struct AiSettings {
    /// API key; `None` disables the model.
    pub api_key: Option<String>,
    /// Model name, e.g. `gemini-1.5-flash-latest`.
    pub model: String,
    /// API base URL.
    pub api_base: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
    /// System instruction sent with every request.
    pub system_instruction: String,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            temperature: 0.4,
            timeout_secs: 60,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

impl std::fmt::Debug for AiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

/// A text generation backend.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Generates free-form text for `prompt`.
    async fn generate_content(&self, prompt: &str) -> Result<String, AiError>;
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    system_instruction: Content<'a>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Google Gemini `generateContent` client.
pub struct GeminiModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    temperature: f32,
    system_instruction: String,
}

impl GeminiModel {
    /// Builds a client from settings.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::MissingCredential`] if no API key is set, or
    /// [`AiError::Request`] if the HTTP client cannot be built.
    pub fn new(settings: &AiSettings) -> Result<Self, AiError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or(AiError::MissingCredential)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            settings.api_base.trim_end_matches('/'),
            settings.model
        );
        Ok(Self {
            client,
            endpoint,
            api_key,
            temperature: settings.temperature,
            system_instruction: settings.system_instruction.clone(),
        })
    }
}

#[async_trait]
impl GenerativeModel for GeminiModel {
    async fn generate_content(&self, prompt: &str) -> Result<String, AiError> {
        let body = GenerateRequest {
            contents: [Content {
                role: Some("user"),
                parts: [Part { text: prompt }],
            }],
            system_instruction: Content {
                role: None,
                parts: [Part {
                    text: &self.system_instruction,
                }],
            },
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: self.temperature,
            },
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let data: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| AiError::InvalidResponse(e.to_string()))?;

        let content = data
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .ok_or_else(|| AiError::InvalidResponse("response contained no candidates".into()))?;

        Ok(content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<String>())
    }
}

// ---------------------------------------------------------------------------
// Client adapter
// ---------------------------------------------------------------------------

/// Lazily initialized, infallible front for a [`GenerativeModel`].
pub struct AiClient {
    settings: AiSettings,
    model: OnceCell<Arc<dyn GenerativeModel>>,
}

impl AiClient {
    /// Creates a client that builds a [`GeminiModel`] on first use.
    #[must_use]
    pub fn new(settings: AiSettings) -> Self {
        Self {
            settings,
            model: OnceCell::new(),
        }
    }

    /// Creates a client around an already constructed model.
    #[must_use]
    pub fn with_model(model: Arc<dyn GenerativeModel>) -> Self {
        Self {
            settings: AiSettings::default(),
            model: OnceCell::new_with(Some(model)),
        }
    }

    /// Returns `true` once the model has been built.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.model.initialized()
    }

    async fn model(&self) -> Result<&Arc<dyn GenerativeModel>, AiError> {
        self.model
            .get_or_try_init(|| async {
                let model = GeminiModel::new(&self.settings)?;
                tracing::info!(model = %self.settings.model, "generative model initialized");
                Ok::<_, AiError>(Arc::new(model) as Arc<dyn GenerativeModel>)
            })
            .await
    }

    /// Generates a reply and returns it as envelope JSON.
    ///
    /// Always returns a string that decodes as an
    /// [`AiReplyEnvelope`].
    pub async fn generate(&self, prompt: &str) -> String {
        let result = match self.model().await {
            Ok(model) => model.generate_content(prompt).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(raw) => {
                tracing::debug!(len = raw.len(), "model replied");
                envelope::normalize(&raw)
            }
            Err(e) => {
                tracing::warn!(error = %e, "AI generation failed");
                AiReplyEnvelope::error(&e).to_json()
            }
        }
    }
}
