//! Request DTOs for the HTTP surface
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::Value;

/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum number of tags on one entry
pub const MAX_TAGS: usize = 16;

/// Request body for the SET operation (PUT /cache/:name)
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: Any JSON document
/// - `ttl_ms`: Optional TTL in milliseconds (uses the cache default if not specified)
/// - `tags`: Optional labels for grouped invalidation
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The cache key
    pub key: String,
    /// The value to store
    pub value: Value,
    /// Optional TTL in milliseconds
    #[serde(default)]
    pub ttl_ms: Option<u64>,
    /// Invalidation tags
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "Key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            ));
        }
        if self.ttl_ms == Some(0) {
            return Some("TTL must be greater than zero".to_string());
        }
        if self.tags.len() > MAX_TAGS {
            return Some(format!("At most {} tags are allowed", MAX_TAGS));
        }
        if self.tags.iter().any(|t| t.is_empty()) {
            return Some("Tags cannot be empty".to_string());
        }
        None
    }
}
