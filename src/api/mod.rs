//! API Module
//!
//! HTTP handlers and routing for the cache administration surface.
//!
//! # Endpoints
//! - `PUT /cache/:name` - Store a JSON value in a named cache
//! - `GET /cache/:name/:key` - Retrieve a value by key
//! - `DELETE /cache/:name/:key` - Delete a key
//! - `POST /cache/:name/invalidate/:tag` - Drop every entry with a tag
//! - `DELETE /cache/:name` - Clear a named cache
//! - `GET /content/:slug` - Rendered page through the singleflight loader
//! - `GET /stats` - Per-cache statistics and rate limiter state
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod middleware;
pub mod routes;

pub use handlers::*;
pub use middleware::{client_identifier, rate_limit_middleware};
pub use routes::create_router;
