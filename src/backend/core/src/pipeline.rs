//! Request shaping for AI-feature calls.
//!
//! For one feature request:
//!
//! 1. response cache lookup (a hit skips everything below)
//! 2. per-client AI rate limit (rejection is the only error surfaced)
//! 3. upstream configured, else fallback
//! 4. global upstream quota, else fallback
//! 5. retry-wrapped generation
//! 6. feature-specific parse, else fallback
//! 7. cache write and `fallback: false` envelope
//!
//! Fallback envelopes are never cached.

use crate::cache::{CacheKey, ResponseCache};
use crate::error::{AppError, Result};
use crate::fallback::{FallbackCatalog, Feature};
use crate::limits::{RateLimitResult, RateLimiter, UpstreamQuota};
use crate::middleware::rate_limit::rejection_with_message;
use crate::retry::{retry, RetryOutcome, RetryPolicy};
use crate::upstream::{TextGenerator, UpstreamError};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Route scope the AI limiter counts under, shared by every feature.
pub const AI_SCOPE: &str = "/api/ai";

// ═══════════════════════════════════════════════════════════════════════════════
// Request / Response
// ═══════════════════════════════════════════════════════════════════════════════

/// What the client sends about its listening habits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListeningSummary {
    #[serde(default)]
    pub top_artists: Vec<String>,
    #[serde(default)]
    pub top_tracks: Vec<String>,
    #[serde(default)]
    pub top_genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<String>,
}

impl ListeningSummary {
    /// Reject summaries with nothing to talk about.
    pub fn validate(&self) -> Result<()> {
        let has_content = [&self.top_artists, &self.top_tracks, &self.top_genres]
            .iter()
            .any(|list| list.iter().any(|s| !s.trim().is_empty()));

        if has_content {
            Ok(())
        } else {
            Err(AppError::validation(
                "Listening summary needs at least one artist, track or genre",
            ))
        }
    }

    /// Prompt text for a feature.
    pub fn prompt(&self, feature: Feature) -> String {
        let list = |items: &[String]| {
            if items.is_empty() {
                "(none)".to_string()
            } else {
                items.iter().take(10).cloned().collect::<Vec<_>>().join(", ")
            }
        };
        let range = self.time_range.as_deref().unwrap_or("recent");

        let facts = format!(
            "Top artists: {}\nTop tracks: {}\nTop genres: {}\nTime range: {}",
            list(&self.top_artists),
            list(&self.top_tracks),
            list(&self.top_genres),
            range,
        );

        let instruction = match feature {
            Feature::Roast => {
                "Write a short, playful roast (3-4 sentences) of this person's music taste. Be witty, never cruel. Reply with plain text only."
            }
            Feature::Personality => {
                "Describe this listener's music personality. Reply with a JSON object of the form {\"personality\": \"<2-3 sentence description>\"} and nothing else."
            }
            Feature::Story => {
                "Tell a short story (one paragraph) about this listener's year in music. Reply with plain text only."
            }
        };

        format!("{instruction}\n\n{facts}")
    }
}

/// Envelope returned by every AI-feature route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureResponse {
    pub feature: Feature,
    pub text: String,
    pub fallback: bool,
    pub error: Option<String>,
}

impl FeatureResponse {
    pub fn generated(feature: Feature, text: String) -> Self {
        Self {
            feature,
            text,
            fallback: false,
            error: None,
        }
    }

    pub fn fallback(feature: Feature, text: String, reason: impl Into<String>) -> Self {
        Self {
            feature,
            text,
            fallback: true,
            error: Some(reason.into()),
        }
    }

    /// `{ success: true, <feature>: text, fallback, error? }`
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("success".into(), Value::Bool(true));
        map.insert(self.feature.as_str().into(), Value::String(self.text.clone()));
        map.insert("fallback".into(), Value::Bool(self.fallback));
        if let Some(ref error) = self.error {
            map.insert("error".into(), Value::String(error.clone()));
        }
        Value::Object(map)
    }
}

/// One feature call as the pipeline sees it.
#[derive(Debug, Clone)]
pub struct FeatureRequest {
    pub feature: Feature,
    /// Caller network identity
    pub identity: String,
    /// Bearer token, if the caller sent one
    pub bearer: Option<String>,
    pub summary: ListeningSummary,
}

impl FeatureRequest {
    pub fn cache_key(&self) -> String {
        let body = serde_json::to_vec(&self.summary).unwrap_or_default();
        CacheKey::new(
            Method::POST,
            format!("{}/{}", AI_SCOPE, self.feature),
            self.bearer.as_deref(),
        )
        .with_body(&body)
        .build()
    }
}

/// What the pipeline produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapedResponse {
    pub body: Value,
    pub cache_hit: bool,
    pub fallback: bool,
    /// AI limiter decision; `None` on a cache hit, which is never counted.
    pub rate_limit: Option<RateLimitResult>,
}

/// The per-client AI limit turned the request away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Throttled(pub RateLimitResult);

impl IntoResponse for Throttled {
    fn into_response(self) -> Response {
        rejection_with_message(&self.0, AI_REJECTION_MESSAGE)
    }
}

const AI_REJECTION_MESSAGE: &str = "Too many AI requests. Please wait before trying again.";

// ═══════════════════════════════════════════════════════════════════════════════
// Pipeline
// ═══════════════════════════════════════════════════════════════════════════════

/// Wires cache, limiter, quota, retry and fallback around one generator.
pub struct Pipeline {
    cache: Arc<ResponseCache>,
    limiter: Arc<RateLimiter>,
    quota: UpstreamQuota,
    generator: Option<Arc<dyn TextGenerator>>,
    retry_policy: RetryPolicy,
    catalog: FallbackCatalog,
    cache_ttl: Duration,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("generator", &self.generator.as_ref().map(|g| g.name()))
            .field("retry_policy", &self.retry_policy)
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}

impl Pipeline {
    pub fn new(
        cache: Arc<ResponseCache>,
        limiter: Arc<RateLimiter>,
        quota: UpstreamQuota,
        generator: Option<Arc<dyn TextGenerator>>,
        retry_policy: RetryPolicy,
    ) -> Self {
        let cache_ttl = cache.config().default_ttl();
        Self {
            cache,
            limiter,
            quota,
            generator,
            retry_policy,
            catalog: FallbackCatalog::builtin(),
            cache_ttl,
        }
    }

    pub fn with_catalog(mut self, catalog: FallbackCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.generator.is_some()
    }

    /// Run one feature request. Only a rate-limit rejection is an `Err`.
    pub async fn run(&self, request: FeatureRequest) -> std::result::Result<ShapedResponse, Throttled> {
        let feature = request.feature;
        let key = request.cache_key();

        if let Some(body) = self.cache.get(&key) {
            debug!(%feature, "Serving cached feature response");
            return Ok(ShapedResponse {
                body,
                cache_hit: true,
                fallback: false,
                rate_limit: None,
            });
        }

        let limit = self.limiter.check(&request.identity, AI_SCOPE);
        if !limit.allowed {
            return Err(Throttled(limit));
        }

        let Some(generator) = self.generator.as_ref() else {
            return Ok(self.fallback(feature, AppError::from(UpstreamError::unconfigured()), limit));
        };

        if let Err(e) = self.quota.acquire() {
            return Ok(self.fallback(feature, e, limit));
        }

        let prompt = request.summary.prompt(feature);
        let generator: &dyn TextGenerator = generator.as_ref();
        let prompt = prompt.as_str();
        let outcome = retry(&self.retry_policy, move || generator.generate(prompt)).await;

        let text = match outcome {
            RetryOutcome::Success(text) => text,
            RetryOutcome::ExhaustedRetries(e) => {
                warn!(%feature, error = %e, "Upstream retries exhausted");
                return Ok(self.fallback(feature, e.into(), limit));
            }
            RetryOutcome::FatalError(e) => {
                return Ok(self.fallback(feature, e.into(), limit));
            }
        };

        let text = match parse_feature_text(feature, &text) {
            Ok(text) => text,
            Err(e) => return Ok(self.fallback(feature, e.into(), limit)),
        };

        let body = FeatureResponse::generated(feature, text).to_json();
        self.cache.set(key, body.clone(), self.cache_ttl);
        info!(%feature, generator = generator.name(), "Generated feature response");

        Ok(ShapedResponse {
            body,
            cache_hit: false,
            fallback: false,
            rate_limit: Some(limit),
        })
    }

    fn fallback(&self, feature: Feature, cause: AppError, limit: RateLimitResult) -> ShapedResponse {
        debug_assert!(cause.code().is_substitutable());
        warn!(
            %feature,
            code = %cause.code(),
            cause = cause.internal_message().unwrap_or(cause.user_message()),
            "Serving fallback response"
        );
        counter!(
            "fallback_served_total",
            "feature" => feature.as_str(),
            "code" => cause.code().to_string(),
        )
        .increment(1);

        let text = self.catalog.select(feature).to_string();
        let body = FeatureResponse::fallback(feature, text, cause.user_message()).to_json();
        ShapedResponse {
            body,
            cache_hit: false,
            fallback: true,
            rate_limit: Some(limit),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Result Parsing
// ═══════════════════════════════════════════════════════════════════════════════

/// Extract the envelope text from raw generated output.
pub fn parse_feature_text(feature: Feature, raw: &str) -> std::result::Result<String, UpstreamError> {
    match feature {
        Feature::Roast | Feature::Story => {
            let text = raw.trim();
            if text.is_empty() {
                Err(UpstreamError::malformed("empty generated text"))
            } else {
                Ok(text.to_string())
            }
        }
        Feature::Personality => {
            #[derive(Deserialize)]
            struct Personality {
                personality: String,
            }

            let json = strip_code_fence(raw);
            let parsed: Personality = serde_json::from_str(json)
                .map_err(|e| UpstreamError::malformed(format!("personality JSON: {e}")))?;
            let text = parsed.personality.trim();
            if text.is_empty() {
                Err(UpstreamError::malformed("empty personality field"))
            } else {
                Ok(text.to_string())
            }
        }
    }
}

/// Body of a ```json fenced block, or the trimmed input when unfenced.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn summary() -> ListeningSummary {
        ListeningSummary {
            top_artists: vec!["Radiohead".into(), "Björk".into()],
            top_tracks: vec!["Idioteque".into()],
            top_genres: vec!["art rock".into()],
            time_range: Some("medium_term".into()),
        }
    }

    #[test]
    fn test_validate_requires_content() {
        assert!(summary().validate().is_ok());
        let empty = ListeningSummary {
            top_artists: vec!["  ".into()],
            ..Default::default()
        };
        assert_eq!(empty.validate().unwrap_err().code(), ErrorCode::ValidationError);
    }

    #[test]
    fn test_prompt_mentions_summary() {
        let prompt = summary().prompt(Feature::Personality);
        assert!(prompt.contains("Radiohead, Björk"));
        assert!(prompt.contains("medium_term"));
        assert!(prompt.contains("\"personality\""));
    }

    #[test]
    fn test_summary_uses_camel_case() {
        let value = serde_json::to_value(summary()).unwrap();
        assert!(value.get("topArtists").is_some());
        assert!(value.get("timeRange").is_some());
    }

    #[test]
    fn test_envelope_shape() {
        let generated = FeatureResponse::generated(Feature::Roast, "ouch".into()).to_json();
        assert_eq!(generated, serde_json::json!({"success": true, "roast": "ouch", "fallback": false}));

        let fallback = FeatureResponse::fallback(Feature::Story, "once".into(), "busy").to_json();
        assert_eq!(
            fallback,
            serde_json::json!({"success": true, "story": "once", "fallback": true, "error": "busy"})
        );
    }

    #[test]
    fn test_parse_plain_text() {
        assert_eq!(parse_feature_text(Feature::Roast, "  nice taste \n").unwrap(), "nice taste");
        assert!(parse_feature_text(Feature::Story, "   ").is_err());
    }

    #[test]
    fn test_parse_personality_fenced_and_bare() {
        let fenced = "```json\n{\"personality\": \"The Night Owl\"}\n```";
        assert_eq!(parse_feature_text(Feature::Personality, fenced).unwrap(), "The Night Owl");

        let bare = "{\"personality\": \"The Explorer\", \"traits\": []}";
        assert_eq!(parse_feature_text(Feature::Personality, bare).unwrap(), "The Explorer");

        assert!(parse_feature_text(Feature::Personality, "you are a night owl").is_err());
        assert!(parse_feature_text(Feature::Personality, "{\"personality\": \"\"}").is_err());
    }

    #[test]
    fn test_cache_key_depends_on_body_and_feature() {
        let request = FeatureRequest {
            feature: Feature::Roast,
            identity: "1.1.1.1".into(),
            bearer: None,
            summary: summary(),
        };
        let mut other = request.clone();
        other.summary.top_genres.push("jazz".into());
        let mut story = request.clone();
        story.feature = Feature::Story;

        assert_ne!(request.cache_key(), other.cache_key());
        assert_ne!(request.cache_key(), story.cache_key());
        assert!(request.cache_key().starts_with("POST:/api/ai/roast:anonymous:"));
    }
}
