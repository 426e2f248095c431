//! Error types for the cache library and its HTTP surface
//!
//! Provides unified error handling using thiserror.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache server.
///
/// Misses, denials and evictions are ordinary outcomes and never show up
/// here; only bad configuration and request-level failures do.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Configuration rejected at construction time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Caller exceeded its request budget
    #[error("Too many requests, retry in {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        let mut response = (status, body).into_response();
        if let CacheError::RateLimited { retry_after_ms } = self {
            // Retry-After is whole seconds, rounded up
            let secs = retry_after_ms.div_ceil(1000).max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache server.
pub type Result<T> = std::result::Result<T, CacheError>;

// == Load Error ==
/// Outcome of a failed singleflight load, shared by every waiter.
///
/// The producer's error is kept behind an `Arc` so all callers that joined
/// the same in-flight computation receive the very same failure.
#[derive(Error)]
pub enum LoadError<E> {
    /// The producer itself failed
    #[error("producer failed: {0}")]
    Producer(Arc<E>),

    /// The producer ran longer than the configured limit
    #[error("producer timed out after {0:?}")]
    Timeout(Duration),

    /// The producer task panicked or was cancelled before settling
    #[error("producer aborted before settling")]
    Aborted,
}

impl<E> LoadError<E> {
    /// Returns the producer error, if that is what failed.
    pub fn producer_error(&self) -> Option<&E> {
        match self {
            LoadError::Producer(err) => Some(err),
            _ => None,
        }
    }
}

// Written by hand so `E` need not be Clone.
impl<E> Clone for LoadError<E> {
    fn clone(&self) -> Self {
        match self {
            LoadError::Producer(err) => LoadError::Producer(Arc::clone(err)),
            LoadError::Timeout(limit) => LoadError::Timeout(*limit),
            LoadError::Aborted => LoadError::Aborted,
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for LoadError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Producer(err) => f.debug_tuple("Producer").field(err).finish(),
            LoadError::Timeout(limit) => f.debug_tuple("Timeout").field(limit).finish(),
            LoadError::Aborted => f.write_str("Aborted"),
        }
    }
}
