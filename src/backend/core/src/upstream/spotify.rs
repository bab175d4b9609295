//! Relay for Spotify Web API reads made on behalf of the caller.

use super::UpstreamError;
use crate::error::{AppError, ErrorCode, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// Spotify client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotifyConfig {
    /// Web API root
    pub api_base_url: String,

    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.spotify.com/v1".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Thin GET relay.
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    client: Client,
    base_url: String,
}

impl SpotifyClient {
    pub fn new(config: &SpotifyConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// GET `path` with the caller's bearer token and return the JSON body.
    #[instrument(skip(self, bearer))]
    pub async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
        bearer: &str,
    ) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));

        let response = self
            .client
            .get(&url)
            .bearer_auth(bearer)
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::from(UpstreamError::from_transport(&e)))?;

        let status = response.status();
        debug!(status = status.as_u16(), "Provider responded");

        match status {
            s if s.is_success() => response.json::<Value>().await.map_err(|e| {
                AppError::with_internal(
                    ErrorCode::MalformedUpstreamResult,
                    "Music provider returned an unreadable result",
                    e.to_string(),
                )
            }),
            StatusCode::UNAUTHORIZED => Err(AppError::new(
                ErrorCode::Unauthorized,
                "Music provider session expired, please log in again",
            )),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = super::gemini::retry_after_header(response.headers()).unwrap_or(1);
                Err(AppError::rate_limited(
                    "Music provider is rate limiting requests",
                    retry_after,
                ))
            }
            other => Err(AppError::with_internal(
                ErrorCode::UpstreamUnavailable,
                "Music provider unavailable",
                format!("HTTP {}", other.as_u16()),
            )),
        }
    }
}
