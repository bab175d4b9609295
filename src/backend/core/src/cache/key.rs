//! Response cache keys.
//!
//! Keys are syntactic: `METHOD:path?query:credential`, where the credential
//! is the first [`CREDENTIAL_PREFIX_LEN`] characters of the caller's bearer
//! token or `anonymous`. POST feature keys fold in a fingerprint of the body.

use axum::http::{header, HeaderMap, Method, Uri};
use sha2::{Digest, Sha256};
use std::fmt;

/// Characters of the bearer token kept in a key.
pub const CREDENTIAL_PREFIX_LEN: usize = 16;

/// Credential segment for callers without a bearer token.
pub const ANONYMOUS: &str = "anonymous";

/// Deterministic key for one cacheable request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    method: Method,
    target: String,
    credential: String,
    body_fingerprint: Option<String>,
}

impl CacheKey {
    /// Key from method, path (with query) and an optional bearer token.
    pub fn new(method: Method, target: impl Into<String>, bearer: Option<&str>) -> Self {
        Self {
            method,
            target: target.into(),
            credential: credential_prefix(bearer),
            body_fingerprint: None,
        }
    }

    /// Key for an incoming request.
    pub fn from_request(method: &Method, uri: &Uri, headers: &HeaderMap) -> Self {
        let target = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string());
        Self::new(method.clone(), target, bearer_token(headers))
    }

    /// Fold a request body into the key.
    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.body_fingerprint = Some(fingerprint(body));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    /// Render the key string used by the store.
    pub fn build(&self) -> String {
        match &self.body_fingerprint {
            Some(fp) => format!("{}:{}:{}:{}", self.method, self.target, self.credential, fp),
            None => format!("{}:{}:{}", self.method, self.target, self.credential),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build())
    }
}

/// Bearer token from `Authorization`, if present and non-empty.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn credential_prefix(bearer: Option<&str>) -> String {
    match bearer {
        Some(token) => token.chars().take(CREDENTIAL_PREFIX_LEN).collect(),
        None => ANONYMOUS.to_string(),
    }
}

/// Short hex SHA-256 of a payload.
fn fingerprint(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    hex::encode(&digest[..16])
}
