//! Text generation over the Gemini `generateContent` REST endpoint.

use super::{TextGenerator, UpstreamError};
use crate::error::{AppError, Result};
use crate::retry::classify_message;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Gemini client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API key; generation is disabled when absent or empty
    pub api_key: Option<String>,

    /// Model name
    pub model: String,

    /// API root
    pub base_url: String,

    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl GeminiConfig {
    /// The key, if one is actually set.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
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
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Gemini REST client.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    /// Build a client, or `None` when no key is configured.
    pub fn from_config(config: &GeminiConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.api_key() else {
            return Ok(None);
        };

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Some(Self {
            client,
            api_key: api_key.to_string(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }))
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    #[instrument(skip(self, prompt), fields(model = %self.model))]
    async fn generate(&self, prompt: &str) -> std::result::Result<String, UpstreamError> {
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::from_transport(&e))?;

        let status = response.status();
        let retry_after = retry_after_header(response.headers());
        let text = response
            .text()
            .await
            .map_err(|e| UpstreamError::from_transport(&e))?;

        if !status.is_success() {
            return Err(map_error_status(status, &text).with_retry_after(retry_after));
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| UpstreamError::malformed(format!("invalid response JSON: {e}")))?;

        let generated: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if generated.trim().is_empty() {
            return Err(UpstreamError::malformed("response had no candidate text"));
        }

        debug!(chars = generated.len(), "Generated text");
        Ok(generated)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// Classify a non-2xx answer.
fn map_error_status(status: StatusCode, body: &str) -> UpstreamError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let message = detail
        .as_ref()
        .map(|d| d.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    let exhausted = detail
        .as_ref()
        .is_some_and(|d| d.error.status == "RESOURCE_EXHAUSTED");

    if status == StatusCode::TOO_MANY_REQUESTS || exhausted {
        UpstreamError::quota(message)
    } else if status.is_server_error() {
        UpstreamError::unavailable(message)
    } else if detail.is_none() && classify_message(body) {
        // Unstructured body that still reads as a quota complaint.
        UpstreamError::quota(message)
    } else {
        UpstreamError::fatal(message)
    }
}

pub(crate) fn retry_after_header(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}
