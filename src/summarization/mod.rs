//! Abstractive document summaries from a remote text-generation service.
//!
//! [`Summarizer`] owns the prompt, the input truncation, and the timeout. It talks to the
//! service through the [`SummarizationClient`] trait so the transport can be swapped in tests.
//! Internally every failure is a typed [`SummarizationError`]; the public
//! [`Summarizer::summarize`] maps it to a fixed plain-language placeholder so the metadata
//! pipeline always gets a string back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::config::Config;

/// Placeholder returned for empty input.
pub const EMPTY_INPUT_MESSAGE: &str = "No text provided to summarize.";
/// Placeholder returned when no credential is configured.
pub const MISSING_CREDENTIAL_MESSAGE: &str = "ERROR: API Key not provided.";
/// Placeholder returned when the service rejects the credential.
pub const INVALID_CREDENTIAL_MESSAGE: &str =
    "ERROR: API Key was rejected by the summarization service.";
/// Placeholder returned when the service cannot be reached.
pub const UNREACHABLE_MESSAGE: &str =
    "Failed to generate summary. Could not connect to the summarization service.";
/// Placeholder returned when the service answers with something unusable.
pub const MALFORMED_RESPONSE_MESSAGE: &str = "Could not generate summary due to an API error.";

/// Errors surfaced while attempting abstractive summarization.
#[derive(Debug, Error)]
pub enum SummarizationError {
    /// No credential was configured.
    #[error("summarization credential not configured")]
    MissingCredential,
    /// Service rejected the credential.
    #[error("summarization credential rejected: {0}")]
    InvalidCredential(String),
    /// Request never produced a response.
    #[error("failed to reach summarization service: {0}")]
    Transport(String),
    /// Service answered with a non-success status.
    #[error("summarization service returned {status}: {body}")]
    Status {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Response body, for diagnostics.
        body: String,
    },
    /// Request exceeded the configured timeout.
    #[error("summarization timed out after {0:?}")]
    Timeout(Duration),
    /// Response did not have the expected shape.
    #[error("malformed summarization response: {0}")]
    InvalidResponse(String),
}

impl SummarizationError {
    /// Placeholder shown to callers for this failure.
    pub fn degraded_message(&self) -> &'static str {
        match self {
            Self::MissingCredential => MISSING_CREDENTIAL_MESSAGE,
            Self::InvalidCredential(_) => INVALID_CREDENTIAL_MESSAGE,
            Self::Transport(_) | Self::Status { .. } | Self::Timeout(_) => UNREACHABLE_MESSAGE,
            Self::InvalidResponse(_) => MALFORMED_RESPONSE_MESSAGE,
        }
    }
}

/// Summary text, either generated or a degraded placeholder. Serializes as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Summary {
    text: String,
    #[serde(skip)]
    degraded: bool,
}

impl Summary {
    /// Wrap text returned by the service.
    pub fn generated(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            degraded: false,
        }
    }

    /// Placeholder for a failed or skipped generation.
    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            text: message.into(),
            degraded: true,
        }
    }

    /// Summary text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether this is a placeholder rather than generated output.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

/// Interface implemented by remote text-generation providers.
#[async_trait]
pub trait SummarizationClient: Send + Sync {
    /// Send `prompt` as the sole content unit and return the generated text.
    async fn generate(&self, prompt: &str) -> Result<String, SummarizationError>;
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    /// Build a client for `model` at `base_url`, authenticated by `api_key`.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, SummarizationError> {
        let http = Client::builder()
            .user_agent("docmeta/summary")
            .build()
            .map_err(|error| SummarizationError::Transport(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[async_trait]
impl SummarizationClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, SummarizationError> {
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }]
        });

        // Header auth keeps the key out of URLs and request logs.
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| SummarizationError::Transport(error.to_string()))?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizationError::InvalidCredential(format!("{status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Gemini reports bad keys as 400 API_KEY_INVALID.
            if status == StatusCode::BAD_REQUEST && body.contains("API_KEY_INVALID") {
                return Err(SummarizationError::InvalidCredential(body));
            }
            return Err(SummarizationError::Status { status, body });
        }

        let body: GenerateContentResponse = response.json().await.map_err(|error| {
            SummarizationError::InvalidResponse(format!("failed to decode response: {error}"))
        })?;

        body.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts.into_iter().next())
            .and_then(|part| part.text)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| {
                SummarizationError::InvalidResponse("response contained no candidate text".into())
            })
    }
}

/// Render the structured-summary instruction around a document excerpt.
pub fn build_prompt(document_text: &str) -> String {
    format!(
        "Your task is to act as a document analyst. Read the following text and provide a \
structured summary in the exact format specified below. Do not add any extra commentary.\n\n\
**FORMAT REQUIRED:**\n\
**Title:** [A concise, descriptive title for the document]\n\
**Overview:** [A single sentence that summarizes the main purpose or conclusion of the text]\n\n\
**Key Sections:**\n\
- Identify all the key sections of the file\n\
---BEGIN DOCUMENT TEXT---\n\
{document_text}\n\
---END DOCUMENT TEXT---\n\n\
Now, generate the structured summary."
    )
}

/// First `max_chars` characters of `text`, cut on a character boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Produces document summaries, falling back to fixed placeholders on failure.
pub struct Summarizer {
    client: Option<Arc<dyn SummarizationClient>>,
    max_chars: usize,
    timeout: Duration,
}

impl Summarizer {
    /// Build a summarizer. `client` is `None` when no credential is configured, in which
    /// case every non-empty request reports a configuration error without network traffic.
    pub fn new(
        client: Option<Arc<dyn SummarizationClient>>,
        max_chars: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            max_chars,
            timeout,
        }
    }

    /// Build the production summarizer from configuration.
    pub fn from_config(config: &Config) -> Self {
        let client = match config.gemini_api_key.as_deref() {
            Some(api_key) => {
                match GeminiClient::new(&config.gemini_api_url, &config.gemini_model, api_key) {
                    Ok(client) => Some(Arc::new(client) as Arc<dyn SummarizationClient>),
                    Err(error) => {
                        tracing::error!(error = %error, "Failed to build summarization client");
                        None
                    }
                }
            }
            None => {
                tracing::warn!("GEMINI_API_KEY not set; summaries will report a configuration error");
                None
            }
        };
        Self::new(client, config.summary_max_chars, config.summary_timeout())
    }

    /// Summarize `text`, returning a typed error on failure.
    pub async fn try_summarize(&self, text: &str) -> Result<String, SummarizationError> {
        let client = self
            .client
            .as_ref()
            .ok_or(SummarizationError::MissingCredential)?;
        let excerpt = truncate_chars(text, self.max_chars);
        let prompt = build_prompt(excerpt);
        tracing::debug!(
            input_chars = excerpt.chars().count(),
            prompt_len = prompt.len(),
            "Requesting summary"
        );

        tokio::time::timeout(self.timeout, client.generate(&prompt))
            .await
            .map_err(|_| SummarizationError::Timeout(self.timeout))?
    }

    /// Summarize `text`. Never fails: errors become a fixed placeholder.
    pub async fn summarize(&self, text: &str) -> Summary {
        if text.is_empty() {
            return Summary::degraded(EMPTY_INPUT_MESSAGE);
        }
        match self.try_summarize(text).await {
            Ok(summary) => Summary::generated(summary),
            Err(error) => {
                tracing::warn!(error = %error, "Summarization degraded");
                Summary::degraded(error.degraded_message())
            }
        }
    }
}
