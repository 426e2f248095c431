//! Response DTOs for the HTTP surface
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

use crate::cache::CacheStats;

/// Response body for GET /cache/:name/:key
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    /// The requested key
    pub key: String,
    /// The stored value
    pub value: Value,
    /// Remaining lifetime in milliseconds
    pub ttl_remaining_ms: Option<u64>,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: Value, ttl_remaining_ms: Option<u64>) -> Self {
        Self {
            key: key.into(),
            value,
            ttl_remaining_ms,
        }
    }
}

/// Response body for PUT /cache/:name
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    /// The key that was set
    pub key: String,
}

impl SetResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
        }
    }
}

/// Response body for DELETE /cache/:name/:key
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Outcome message
    pub message: String,
    /// The key that was targeted
    pub key: String,
    /// Whether an entry existed
    pub deleted: bool,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>, deleted: bool) -> Self {
        let key = key.into();
        let message = if deleted {
            format!("Key '{}' deleted successfully", key)
        } else {
            format!("Key '{}' was not cached", key)
        };
        Self {
            message,
            key,
            deleted,
        }
    }
}

/// Response body for POST /cache/:name/invalidate/:tag
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    /// The invalidated tag
    pub tag: String,
    /// Number of entries removed
    pub removed: usize,
}

impl InvalidateResponse {
    pub fn new(tag: impl Into<String>, removed: usize) -> Self {
        Self {
            tag: tag.into(),
            removed,
        }
    }
}

/// Response body for DELETE /cache/:name
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
}

impl ClearResponse {
    pub fn new(cache: &str) -> Self {
        Self {
            message: format!("Cache '{}' cleared", cache),
        }
    }
}

/// Statistics for one named cache
#[derive(Debug, Clone, Serialize)]
pub struct NamedCacheStats {
    /// Cache instance name
    pub name: String,
    /// Configured entry bound
    pub max_size: usize,
    #[serde(flatten)]
    pub stats: CacheStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl NamedCacheStats {
    pub fn new(name: impl Into<String>, max_size: usize, stats: CacheStats) -> Self {
        let hit_rate = stats.hit_rate();
        Self {
            name: name.into(),
            max_size,
            stats,
            hit_rate,
        }
    }
}

/// Rate limiter snapshot
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    /// Identifiers with a window on record
    pub tracked_identifiers: usize,
    /// Requests allowed per window
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

/// Response body for GET /stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub caches: Vec<NamedCacheStats>,
    pub rate_limiter: RateLimiterStats,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
