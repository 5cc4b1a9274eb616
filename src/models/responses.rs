//! Response DTOs for the diagnostics API

use serde::Serialize;
use serde_json::Value;

use crate::config::CacheConfig;

/// Response body for GET /entries/:key
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub value: Value,
    /// The entry is past its ttl
    pub is_stale: bool,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: Value, is_stale: bool) -> Self {
        Self {
            key: key.into(),
            value,
            is_stale,
        }
    }
}

/// Response body for PUT /entries, echoing what was stored and under which windows.
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    pub key: String,
    /// Estimated size in bytes
    pub size: usize,
    pub ttl_ms: u64,
    pub max_age_ms: u64,
    pub stale_while_revalidate: bool,
}

impl SetResponse {
    pub fn stored(key: impl Into<String>, size: usize, config: &CacheConfig) -> Self {
        Self {
            key: key.into(),
            size,
            ttl_ms: config.ttl_ms(),
            max_age_ms: config.max_age_ms(),
            stale_while_revalidate: config.stale_while_revalidate,
        }
    }
}

/// Response body for DELETE /entries/:key
#[derive(Debug, Clone, Serialize)]
pub struct ClearedResponse {
    pub key: String,
    pub cleared: bool,
}

impl ClearedResponse {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            cleared: true,
        }
    }
}

/// Response body for bulk removals (DELETE /entries, POST /cleanup)
#[derive(Debug, Clone, Serialize)]
pub struct RemovedResponse {
    /// Number of entries removed
    pub removed: usize,
}

impl RemovedResponse {
    pub fn new(removed: usize) -> Self {
        Self { removed }
    }
}

/// Response body for GET /health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// RFC 3339 wall-clock time of the check
    pub timestamp: String,
    pub entries: usize,
}

impl HealthResponse {
    pub fn healthy(entries: usize) -> Self {
        Self {
            status: "healthy",
            timestamp: chrono::Utc::now().to_rfc3339(),
            entries,
        }
    }
}

/// Body of every error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
