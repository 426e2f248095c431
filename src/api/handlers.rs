//! API Handlers
//!
//! HTTP request handlers for the named caches, content loading and stats.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::cache::Cache;
use crate::config::{Config, RateLimitConfig};
use crate::error::{CacheError, LoadError, Result};
use crate::models::{
    ClearResponse, DeleteResponse, GetResponse, HealthResponse, InvalidateResponse,
    NamedCacheStats, RateLimiterStats, SetRequest, SetResponse, StatsResponse,
};
use crate::ratelimit::RateLimiter;
use crate::singleflight::Singleflight;

/// Cache instance names.
pub const TRANSLATION_CACHE: &str = "translation";
pub const API_CACHE: &str = "api";
pub const CONTENT_CACHE: &str = "content";

/// Tag attached to every rendered content page.
pub const CONTENT_TAG: &str = "content";

/// Application state shared across all handlers.
///
/// Every cache is its own instance with its own lock; nothing here is a
/// process-wide singleton.
#[derive(Clone)]
pub struct AppState {
    /// Named caches, addressable from the admin routes
    pub caches: Arc<BTreeMap<String, Cache<Value>>>,
    /// Singleflight loader over the content cache
    pub content: Singleflight<Value, CacheError>,
    /// Request admission
    pub rate_limiter: Arc<RateLimiter>,
    /// Limits applied by the middleware
    pub rate_limit: RateLimitConfig,
}

impl AppState {
    /// Assembles state from already constructed parts.
    ///
    /// Fails if the rate limit configuration is invalid or the content
    /// cache is missing.
    pub fn new(
        caches: Vec<Cache<Value>>,
        rate_limiter: Arc<RateLimiter>,
        rate_limit: RateLimitConfig,
    ) -> Result<Self> {
        rate_limit.validate()?;

        let caches: BTreeMap<String, Cache<Value>> = caches
            .into_iter()
            .map(|cache| (cache.name().to_string(), cache))
            .collect();

        let content_cache = caches.get(CONTENT_CACHE).cloned().ok_or_else(|| {
            CacheError::InvalidConfig(format!("missing '{}' cache", CONTENT_CACHE))
        })?;

        Ok(Self {
            caches: Arc::new(caches),
            content: Singleflight::new(content_cache),
            rate_limiter,
            rate_limit,
        })
    }

    /// Creates a new AppState from configuration.
    ///
    /// Fails if any cache or rate limit configuration is invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        let caches = vec![
            Cache::new(TRANSLATION_CACHE, config.translation_cache.clone())?,
            Cache::new(API_CACHE, config.api_cache.clone())?,
            Cache::new(CONTENT_CACHE, config.content_cache.clone())?,
        ];
        Self::new(
            caches,
            Arc::new(RateLimiter::new()),
            config.rate_limit.clone(),
        )
    }

    /// Looks up a cache by name.
    pub fn cache(&self, name: &str) -> Result<&Cache<Value>> {
        self.caches
            .get(name)
            .ok_or_else(|| CacheError::NotFound(format!("cache '{}'", name)))
    }
}

/// Handler for PUT /cache/:name
///
/// Stores a JSON value, with optional TTL and tags.
pub async fn set_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let cache = state.cache(&name)?;
    match req.ttl_ms {
        Some(ms) => cache.set(&req.key, req.value, Duration::from_millis(ms), req.tags),
        None => cache.set_default(&req.key, req.value, req.tags),
    }

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /cache/:name/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path((name, key)): Path<(String, String)>,
) -> Result<Json<GetResponse>> {
    let cache = state.cache(&name)?;
    let value = cache
        .get(&key)
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;
    let ttl_remaining_ms = cache.ttl_remaining(&key).map(|d| d.as_millis() as u64);

    Ok(Json(GetResponse::new(key, value, ttl_remaining_ms)))
}

/// Handler for DELETE /cache/:name/:key
///
/// Succeeds whether or not the key was cached.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path((name, key)): Path<(String, String)>,
) -> Result<Json<DeleteResponse>> {
    let deleted = state.cache(&name)?.delete(&key);
    Ok(Json(DeleteResponse::new(key, deleted)))
}

/// Handler for POST /cache/:name/invalidate/:tag
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path((name, tag)): Path<(String, String)>,
) -> Result<Json<InvalidateResponse>> {
    let removed = state.cache(&name)?.invalidate_tag(&tag);
    Ok(Json(InvalidateResponse::new(tag, removed)))
}

/// Handler for DELETE /cache/:name
pub async fn clear_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ClearResponse>> {
    state.cache(&name)?.clear();
    Ok(Json(ClearResponse::new(&name)))
}

/// Handler for GET /content/:slug
///
/// Served through the singleflight loader: concurrent misses for one slug
/// render it once. Render failures surface exactly as an uncached render
/// failure would.
pub async fn content_handler(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Value>> {
    let key = format!("page:{slug}");
    let producer_slug = slug.clone();

    let page = state
        .content
        .get_or_compute(&key, move || render_page(producer_slug), None, [CONTENT_TAG])
        .await
        .map_err(|err| match err {
            LoadError::Producer(inner) => (*inner).clone(),
            LoadError::Timeout(limit) => CacheError::Internal(format!(
                "rendering '{}' timed out after {} ms",
                slug,
                limit.as_millis()
            )),
            LoadError::Aborted => CacheError::Internal(format!("rendering '{}' aborted", slug)),
        })?;

    Ok(Json(page))
}

/// Renders a content page. Stand-in for the expensive backing query.
async fn render_page(slug: String) -> Result<Value> {
    let valid = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid {
        return Err(CacheError::InvalidRequest(format!(
            "invalid slug '{}'",
            slug
        )));
    }

    let title = slug
        .split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    Ok(json!({
        "slug": slug,
        "title": title,
        "rendered_at": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let caches = state
        .caches
        .values()
        .map(|cache| NamedCacheStats::new(cache.name(), cache.config().max_size, cache.stats()))
        .collect();

    Json(StatsResponse {
        caches,
        rate_limiter: RateLimiterStats {
            tracked_identifiers: state.rate_limiter.tracked(),
            max_requests: state.rate_limit.max_requests,
            window_ms: state.rate_limit.window.as_millis() as u64,
        },
    })
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
