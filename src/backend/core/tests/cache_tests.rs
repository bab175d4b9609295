//! Integration tests for the response cache.
//!
//! Tests cover:
//! - TTL expiry observed lazily and by sweeping
//! - Bulk eviction of the oldest entries by insertion order
//! - Pattern-based clearing
//! - Key derivation from requests

use axum::http::{HeaderMap, HeaderValue, Method, Uri};
use roastify_core::cache::{CacheConfig, CacheKey, ResponseCache};
use roastify_core::clock::ManualClock;
use roastify_core::error::ErrorCode;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn cache_with(config: CacheConfig) -> (ResponseCache, Arc<ManualClock>) {
    let clock = ManualClock::starting_now();
    (ResponseCache::with_clock(config, clock.clone()), clock)
}

// ============================================================================
// Expiry
// ============================================================================

#[test]
fn test_lazy_expiry_and_sweep_agree() {
    let config = CacheConfig::default();
    let (lazy, lazy_clock) = cache_with(config.clone());
    let (swept, swept_clock) = cache_with(config);

    for cache in [&lazy, &swept] {
        cache.set("short", json!(1), Duration::from_secs(5));
        cache.set("long", json!(2), Duration::from_secs(600));
    }

    lazy_clock.advance(Duration::from_secs(5));
    swept_clock.advance(Duration::from_secs(5));

    assert_eq!(swept.sweep(), 1);
    assert_eq!(swept.len(), 1);

    for cache in [&lazy, &swept] {
        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.get("long"), Some(json!(2)));
    }
    // Lazy removal dropped the expired entry on read.
    assert_eq!(lazy.len(), 1);
}

#[test]
fn test_default_ttl_applies_to_insert() {
    let config = CacheConfig::builder()
        .default_ttl(Duration::from_secs(300))
        .build();
    let (cache, clock) = cache_with(config);

    cache.insert("GET:/api/spotify/me:anonymous", json!({"id": "u1"}));
    clock.advance(Duration::from_secs(299));
    assert!(cache.contains("GET:/api/spotify/me:anonymous"));

    clock.advance(Duration::from_secs(1));
    assert!(!cache.contains("GET:/api/spotify/me:anonymous"));
}

#[test]
fn test_zero_ttl_expires_almost_immediately() {
    let (cache, clock) = cache_with(CacheConfig::default());

    cache.set("k", json!("v"), Duration::ZERO);
    assert_eq!(cache.get("k"), Some(json!("v")));

    clock.advance_ms(1);
    assert_eq!(cache.get("k"), None);
}

// ============================================================================
// Eviction
// ============================================================================

#[test]
fn test_full_cache_evicts_oldest_batch() {
    let config = CacheConfig::builder()
        .max_entries(10)
        .eviction_batch(4)
        .build();
    let (cache, _clock) = cache_with(config);

    for i in 0..10 {
        cache.insert(format!("k{i}"), json!(i));
    }
    assert_eq!(cache.len(), 10);

    cache.insert("k10", json!(10));

    assert_eq!(cache.len(), 7);
    for i in 0..4 {
        assert!(!cache.contains(&format!("k{i}")), "k{i} should be evicted");
    }
    for i in 4..=10 {
        assert!(cache.contains(&format!("k{i}")), "k{i} should remain");
    }
    assert_eq!(cache.stats().evictions, 4);
}

#[test]
fn test_overwrite_does_not_evict_or_reorder() {
    let config = CacheConfig::builder()
        .max_entries(3)
        .eviction_batch(1)
        .build();
    let (cache, _clock) = cache_with(config);

    cache.insert("a", json!(1));
    cache.insert("b", json!(2));
    cache.insert("c", json!(3));

    // Overwriting at capacity keeps every key.
    cache.insert("a", json!(10));
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.get("a"), Some(json!(10)));

    // "a" still holds the oldest slot.
    cache.insert("d", json!(4));
    assert!(!cache.contains("a"));
    assert!(cache.contains("b"));
    assert!(cache.contains("d"));
}

#[test]
fn test_batch_larger_than_cache_empties_it() {
    let config = CacheConfig::builder()
        .max_entries(5)
        .eviction_batch(100)
        .build();
    let (cache, _clock) = cache_with(config);

    for i in 0..5 {
        cache.insert(format!("k{i}"), json!(i));
    }
    cache.insert("new", json!("fresh"));

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("new"), Some(json!("fresh")));
}

// ============================================================================
// Clearing
// ============================================================================

#[test]
fn test_clear_by_pattern() {
    let (cache, _clock) = cache_with(CacheConfig::default());
    cache.insert("GET:/api/spotify/me:abc", json!(1));
    cache.insert("GET:/api/spotify/top/artists?limit=5:abc", json!(2));
    cache.insert("POST:/api/ai/roast:abc#00ff", json!(3));

    assert_eq!(cache.clear(Some("^GET:/api/spotify/top")).unwrap(), 1);
    assert_eq!(cache.len(), 2);

    assert_eq!(cache.clear(None).unwrap(), 2);
    assert!(cache.is_empty());
}

#[test]
fn test_invalid_pattern_is_rejected() {
    let (cache, _clock) = cache_with(CacheConfig::default());
    cache.insert("k", json!(1));

    let err = cache.clear(Some("([unclosed")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidPattern);
    assert_eq!(cache.len(), 1);
}

// ============================================================================
// Keys
// ============================================================================

#[test]
fn test_key_uses_credential_prefix() {
    let mut headers = HeaderMap::new();
    headers.insert(
        "authorization",
        HeaderValue::from_static("Bearer BQD1234567890abcdefghijklmnop"),
    );
    let uri: Uri = "/api/spotify/top/artists?limit=5".parse().unwrap();

    let key = CacheKey::from_request(&Method::GET, &uri, &headers).build();
    assert_eq!(key, "GET:/api/spotify/top/artists?limit=5:BQD1234567890abc");

    let anonymous = CacheKey::from_request(&Method::GET, &uri, &HeaderMap::new()).build();
    assert_eq!(anonymous, "GET:/api/spotify/top/artists?limit=5:anonymous");
}

#[test]
fn test_body_fingerprint_separates_post_keys() {
    let a = CacheKey::new(Method::POST, "/api/ai/roast", None)
        .with_body(br#"{"topArtists":["A"]}"#)
        .build();
    let b = CacheKey::new(Method::POST, "/api/ai/roast", None)
        .with_body(br#"{"topArtists":["B"]}"#)
        .build();
    let a_again = CacheKey::new(Method::POST, "/api/ai/roast", None)
        .with_body(br#"{"topArtists":["A"]}"#)
        .build();

    assert_ne!(a, b);
    assert_eq!(a, a_again);
    assert!(a.starts_with("POST:/api/ai/roast:anonymous"));
}
