//! # Remote Generative API Client
//!
//! Thin client for the Gemini `generateContent` REST endpoint, used for two
//! things: schema-constrained intent classification and speech synthesis.
//!
//! ## Error Surface:
//! Every failure becomes a `GeminiError`; handlers turn it into a 500 with
//! the upstream status or parse details embedded. Nothing is retried.

pub mod intent;
pub mod tts;

use crate::config::GeminiConfig;
use crate::error::AppError;
use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

pub use intent::{ClinicIntent, Urgency};
pub use tts::SynthesizedAudio;

/// Upstream bodies are cut to this many characters in errors and logs.
const MAX_BODY_EXCERPT: usize = 500;

#[derive(Debug)]
pub enum GeminiError {
    /// Non-2xx response from the remote API
    Http { status: u16, body: String },

    /// The per-call deadline passed
    Timeout { operation: &'static str, after: Duration },

    /// Connection or protocol failure before a response arrived
    Transport(String),

    /// The model produced no candidate (e.g. safety block)
    NoCandidate(String),

    /// The response was missing fields or did not parse
    Malformed(String),
}

impl fmt::Display for GeminiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeminiError::Http { status, body } => {
                write!(f, "LLM service error (HTTP {}): {}", status, body)
            }
            GeminiError::Timeout { operation, after } => {
                write!(f, "{} request timed out after {}s", operation, after.as_secs())
            }
            GeminiError::Transport(msg) => write!(f, "LLM service unreachable: {}", msg),
            GeminiError::NoCandidate(msg) => write!(f, "LLM returned no candidate: {}", msg),
            GeminiError::Malformed(msg) => write!(f, "LLM response invalid: {}", msg),
        }
    }
}

impl std::error::Error for GeminiError {}

impl From<GeminiError> for AppError {
    fn from(err: GeminiError) -> Self {
        AppError::Upstream(err.to_string())
    }
}

/// Envelope shared by both call kinds.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

impl GenerateContentResponse {
    /// The first part of the first candidate, which is all either call uses.
    fn into_first_part(self) -> Result<Part, GeminiError> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            let reason = self
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "empty candidate list".to_string());
            return Err(GeminiError::NoCandidate(reason));
        };

        let finish_reason = candidate.finish_reason.unwrap_or_default();
        candidate
            .content
            .and_then(|c| c.parts.into_iter().next())
            .ok_or_else(|| {
                GeminiError::Malformed(format!(
                    "candidate has no content parts (finishReason: {})",
                    if finish_reason.is_empty() { "unknown" } else { &finish_reason }
                ))
            })
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    intent_model: String,
    tts_model: String,
    default_voice: String,
    intent_timeout: Duration,
    tts_timeout: Duration,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("intent_model", &self.intent_model)
            .field("tts_model", &self.tts_model)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    /// Build a client, or `None` when no usable API key is configured.
    pub fn from_config(config: &GeminiConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.usable_api_key() else {
            return Ok(None);
        };

        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Some(Self {
            http,
            api_key: api_key.to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            intent_model: config.intent_model.clone(),
            tts_model: config.tts_model.clone(),
            default_voice: config.default_voice.clone(),
            intent_timeout: Duration::from_secs(config.intent_timeout_secs),
            tts_timeout: Duration::from_secs(config.tts_timeout_secs),
        }))
    }

    /// POST a `generateContent` request and decode the envelope.
    async fn generate(
        &self,
        operation: &'static str,
        model: &str,
        timeout: Duration,
        payload: &Value,
    ) -> Result<GenerateContentResponse, GeminiError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| classify_transport_error(e, operation, timeout))?;

        let status = response.status();
        tracing::info!(operation, model, status = status.as_u16(), "Remote API responded");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = excerpt(&body, MAX_BODY_EXCERPT);
            tracing::error!(operation, status = status.as_u16(), body = %body, "Remote API error");
            return Err(GeminiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| classify_transport_error(e, operation, timeout))
    }
}

fn classify_transport_error(err: reqwest::Error, operation: &'static str, timeout: Duration) -> GeminiError {
    if err.is_timeout() {
        GeminiError::Timeout {
            operation,
            after: timeout,
        }
    } else if err.is_decode() {
        GeminiError::Malformed(err.to_string())
    } else {
        GeminiError::Transport(err.to_string())
    }
}

/// First `max_chars` characters of `text`, marked when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A client pointed at a mock server.
    pub fn client_for(base_url: &str) -> GeminiClient {
        let config = GeminiConfig {
            api_key: Some("test-key".to_string()),
            base_url: base_url.to_string(),
            intent_timeout_secs: 2,
            tts_timeout_secs: 2,
            ..crate::config::AppConfig::default().gemini
        };
        GeminiClient::from_config(&config).unwrap().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_no_client_without_key() {
        let mut config = AppConfig::default().gemini;
        assert!(GeminiClient::from_config(&config).unwrap().is_none());

        config.api_key = Some("YOUR_API_KEY_HERE".to_string());
        assert!(GeminiClient::from_config(&config).unwrap().is_none());

        config.api_key = Some("AIza-real".to_string());
        assert!(GeminiClient::from_config(&config).unwrap().is_some());
    }

    #[test]
    fn test_debug_output_hides_key() {
        let client = test_support::client_for("http://localhost:1/");
        let debug = format!("{:?}", client);
        assert!(!debug.contains("test-key"));
        assert!(debug.contains("http://localhost:1"));
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("şikayet", 3), "şik…");
        assert_eq!(excerpt("kısa", 10), "kısa");
    }

    #[test]
    fn test_block_reason_reported_when_no_candidates() {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates": [], "promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();

        let err = response.into_first_part().unwrap_err();
        assert!(matches!(err, GeminiError::NoCandidate(ref r) if r == "SAFETY"));
    }

    #[test]
    fn test_upstream_error_maps_to_server_error() {
        let app_err: AppError = GeminiError::Http {
            status: 403,
            body: "API key not valid".to_string(),
        }
        .into();

        assert_eq!(app_err.error_type(), "upstream_error");
        assert!(app_err.to_string().contains("HTTP 403"));
        assert!(app_err.to_string().contains("API key not valid"));
    }
}
