//! Configuration Module
//!
//! Handles loading cache, rate-limit and server settings from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};
use crate::ratelimit::MAX_WINDOW;

// == Cache Config ==
/// Settings for one named cache instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries the cache can hold
    pub max_size: usize,
    /// TTL applied when a write does not name one
    pub default_ttl: Duration,
    /// Period of the background reaper
    pub cleanup_interval: Duration,
    /// Longest a singleflight producer may run before it is failed
    pub producer_timeout: Duration,
}

impl CacheConfig {
    /// Loads a cache config from `{prefix}MAX_ENTRIES`, `{prefix}DEFAULT_TTL_MS`,
    /// `{prefix}CLEANUP_INTERVAL_MS` and `{prefix}PRODUCER_TIMEOUT_MS`.
    ///
    /// Unset or unparseable variables fall back to the defaults.
    pub fn from_env(prefix: &str) -> Self {
        let defaults = Self::default();
        Self {
            max_size: env_or(&format!("{prefix}MAX_ENTRIES"), defaults.max_size),
            default_ttl: env_ms_or(&format!("{prefix}DEFAULT_TTL_MS"), defaults.default_ttl),
            cleanup_interval: env_ms_or(
                &format!("{prefix}CLEANUP_INTERVAL_MS"),
                defaults.cleanup_interval,
            ),
            producer_timeout: env_ms_or(
                &format!("{prefix}PRODUCER_TIMEOUT_MS"),
                defaults.producer_timeout,
            ),
        }
    }

    /// Rejects bounds a cache cannot sensibly run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(CacheError::InvalidConfig(
                "max_size must be greater than zero".to_string(),
            ));
        }
        if self.default_ttl.is_zero() {
            return Err(CacheError::InvalidConfig(
                "default_ttl must be greater than zero".to_string(),
            ));
        }
        if self.cleanup_interval.is_zero() {
            return Err(CacheError::InvalidConfig(
                "cleanup_interval must be greater than zero".to_string(),
            ));
        }
        if self.producer_timeout.is_zero() {
            return Err(CacheError::InvalidConfig(
                "producer_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            default_ttl: Duration::from_secs(5 * 60),
            cleanup_interval: Duration::from_secs(60),
            producer_timeout: Duration::from_secs(30),
        }
    }
}

// == Rate Limit Config ==
/// Settings for the request rate limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per identifier per window
    pub max_requests: u32,
    /// Length of one fixed window
    pub window: Duration,
    /// Period of the sweep that drops finished windows
    pub cleanup_interval: Duration,
}

impl RateLimitConfig {
    /// Rejects windows and sweep periods the limiter cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.window.is_zero() {
            return Err(CacheError::InvalidConfig(
                "rate limit window must be greater than zero".to_string(),
            ));
        }
        if self.window > MAX_WINDOW {
            return Err(CacheError::InvalidConfig(format!(
                "rate limit window must be at most {} ms",
                MAX_WINDOW.as_millis()
            )));
        }
        if self.cleanup_interval.is_zero() {
            return Err(CacheError::InvalidConfig(
                "rate limit cleanup_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

// == Server Config ==
/// Process configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cache for translated strings
    pub translation_cache: CacheConfig,
    /// Cache for API responses
    pub api_cache: CacheConfig,
    /// Cache for rendered content
    pub content_cache: CacheConfig,
    /// Request admission
    pub rate_limit: RateLimitConfig,
    /// HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `TRANSLATION_CACHE_*`, `API_CACHE_*`, `CONTENT_CACHE_*` - per-cache
    ///   settings, see [`CacheConfig::from_env`]
    /// - `RATE_LIMIT_MAX_REQUESTS` - Requests per window (default: 100)
    /// - `RATE_LIMIT_WINDOW_MS` - Window length (default: 60000)
    /// - `RATE_LIMIT_CLEANUP_INTERVAL_MS` - Window sweep period (default: 60000)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let rate_defaults = RateLimitConfig::default();
        Self {
            translation_cache: CacheConfig::from_env("TRANSLATION_CACHE_"),
            api_cache: CacheConfig::from_env("API_CACHE_"),
            content_cache: CacheConfig::from_env("CONTENT_CACHE_"),
            rate_limit: RateLimitConfig {
                max_requests: env_or("RATE_LIMIT_MAX_REQUESTS", rate_defaults.max_requests),
                window: env_ms_or("RATE_LIMIT_WINDOW_MS", rate_defaults.window),
                cleanup_interval: env_ms_or(
                    "RATE_LIMIT_CLEANUP_INTERVAL_MS",
                    rate_defaults.cleanup_interval,
                ),
            },
            server_port: env_or("SERVER_PORT", 3000),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            translation_cache: CacheConfig::default(),
            api_cache: CacheConfig::default(),
            content_cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            server_port: 3000,
        }
    }
}

// == Helpers ==
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_ms_or(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
