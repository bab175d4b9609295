//! Configuration management.
//!
//! Sources, later ones winning: built-in defaults, an optional file, then
//! environment variables prefixed `ROASTIFY` with `__` between sections
//! (`ROASTIFY__LIMITS__AI__MAX_REQUESTS=10`). Read once at start.

use crate::cache::CacheConfig;
use crate::error::Result;
use crate::fallback::FallbackConfig;
use crate::limits::RateLimitConfig;
use crate::retry::RetryPolicy;
use crate::telemetry::LoggingConfig;
use crate::upstream::{GeminiConfig, SpotifyConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ENV_PREFIX: &str = "ROASTIFY";

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limits and the upstream quota
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Response cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Upstream retry policy
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Text-generation upstream
    #[serde(default)]
    pub upstream: GeminiConfig,

    /// Music provider relay
    #[serde(default)]
    pub spotify: SpotifyConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Replacement fallback payloads
    #[serde(default)]
    pub fallbacks: FallbackConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins; empty allows any
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// General API routes
    #[serde(default = "RateLimitConfig::general_api")]
    pub api: RateLimitConfig,

    /// AI-feature requests per client
    #[serde(default = "RateLimitConfig::ai_feature")]
    pub ai: RateLimitConfig,

    /// Music provider relay
    #[serde(default = "RateLimitConfig::provider")]
    pub provider: RateLimitConfig,

    /// Global calls per minute to the text-generation upstream
    #[serde(default = "default_upstream_quota")]
    pub upstream_quota_per_minute: u64,

    /// Period of the counter sweep, in milliseconds
    #[serde(default = "default_counter_sweep_interval")]
    pub counter_sweep_interval_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            api: RateLimitConfig::general_api(),
            ai: RateLimitConfig::ai_feature(),
            provider: RateLimitConfig::provider(),
            upstream_quota_per_minute: default_upstream_quota(),
            counter_sweep_interval_ms: default_counter_sweep_interval(),
        }
    }
}

impl LimitsConfig {
    pub fn counter_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.counter_sweep_interval_ms)
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 3001 }
fn default_upstream_quota() -> u64 { 15 }
fn default_counter_sweep_interval() -> u64 { 60_000 }

impl Config {
    /// Load configuration from defaults and the environment.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?)
            .add_source(Self::environment())
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, environment still overriding.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?)
            .add_source(config::File::with_name(path))
            .add_source(Self::environment())
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
    }
}
