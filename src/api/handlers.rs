//! API Handlers
//!
//! HTTP request handlers for each diagnostics endpoint.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use regex::Regex;
use serde_json::Value;

use crate::cache::{CacheManager, CacheStats};
use crate::config::{CacheConfig, ManagerSettings};
use crate::error::{CacheError, Result};
use crate::models::{
    ClearQuery, ClearedResponse, GetResponse, HealthResponse, RemovedResponse, SetRequest,
    SetResponse,
};

/// Application state shared across all handlers.
///
/// The manager handle is already shareable, so no extra locking is needed.
#[derive(Clone)]
pub struct AppState {
    /// Cache of arbitrary JSON values
    pub cache: CacheManager<Value>,
    /// Policy applied to writes that carry no overrides
    pub default_config: CacheConfig,
}

impl AppState {
    pub fn new(cache: CacheManager<Value>, default_config: CacheConfig) -> Self {
        Self {
            cache,
            default_config,
        }
    }

    /// Creates a new AppState with a fresh manager built from settings.
    pub fn from_settings(settings: &ManagerSettings) -> Self {
        Self::new(CacheManager::new(settings.clone()), CacheConfig::default())
    }
}

/// Handler for PUT /entries
///
/// Stores a JSON value under the default config plus any overrides.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let config = req.config(&state.default_config)?;
    let size = state.cache.set(&req.key, req.value, &config)?;

    Ok(Json(SetResponse::stored(req.key, size, &config)))
}

/// Handler for GET /entries/:key
///
/// Returns the stored value with its staleness, however old it is.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let read = state
        .cache
        .get_cached_stale(&key)
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;

    Ok(Json(GetResponse::new(key, read.data, read.is_stale)))
}

/// Handler for DELETE /entries/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ClearedResponse>> {
    if !state.cache.clear(&key) {
        return Err(CacheError::NotFound(key));
    }

    Ok(Json(ClearedResponse::new(key)))
}

/// Handler for DELETE /entries
///
/// Clears keys matching `?pattern=<regex>`, or the whole cache without one.
pub async fn clear_handler(
    State(state): State<AppState>,
    Query(query): Query<ClearQuery>,
) -> Result<Json<RemovedResponse>> {
    let removed = match query.pattern {
        Some(pattern) => {
            let regex =
                Regex::new(&pattern).map_err(|e| CacheError::InvalidPattern(e.to_string()))?;
            state.cache.clear_pattern(&regex)
        }
        None => state.cache.clear_all(),
    };

    Ok(Json(RemovedResponse::new(removed)))
}

/// Handler for POST /cleanup
pub async fn cleanup_handler(State(state): State<AppState>) -> Json<RemovedResponse> {
    Json(RemovedResponse::new(state.cache.cleanup()))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.cache.stats())
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(state.cache.len()))
}
