//! API Module
//!
//! HTTP handlers and routing for the cache diagnostics API.
//!
//! # Endpoints
//! - `PUT /entries` - Store a JSON value
//! - `GET /entries/:key` - Read a value regardless of age
//! - `DELETE /entries/:key` - Clear one key
//! - `DELETE /entries?pattern=` - Clear keys matching a regex, or everything
//! - `POST /cleanup` - Remove expired entries
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
