//! Request DTOs for the diagnostics API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::config::{CacheConfig, ConfigOverrides};
use crate::error::Result;

/// Request body for the SET operation (PUT /entries)
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: Any JSON value
/// - `ttl_ms`, `max_age_ms`, `stale_while_revalidate`, `max_size`: optional
///   overrides applied on top of the server's default config
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The cache key
    pub key: String,
    /// The value to store
    pub value: Value,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
    #[serde(default)]
    pub max_age_ms: Option<u64>,
    #[serde(default)]
    pub stale_while_revalidate: Option<bool>,
    #[serde(default)]
    pub max_size: Option<usize>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > 256 {
            return Some("Key exceeds maximum length of 256 characters".to_string());
        }
        None
    }

    /// Applies the request's overrides to `base`.
    pub fn config(&self, base: &CacheConfig) -> Result<CacheConfig> {
        let overrides = ConfigOverrides {
            ttl: self.ttl_ms.map(Duration::from_millis),
            max_age: self.max_age_ms.map(Duration::from_millis),
            stale_while_revalidate: self.stale_while_revalidate,
            max_size: self.max_size,
            max_entries: None,
        };
        base.with_overrides(overrides)
    }
}

/// Query string for DELETE /entries
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClearQuery {
    /// Regex matched against keys; absent clears everything
    #[serde(default)]
    pub pattern: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_request_deserialize() {
        let json = r#"{"key": "test", "value": {"v": 1}}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.key, "test");
        assert_eq!(req.value["v"], 1);
        assert!(req.ttl_ms.is_none());
    }

    #[test]
    fn test_set_request_overrides_config() {
        let json = r#"{"key": "test", "value": 1, "ttl_ms": 100, "max_age_ms": 200}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();

        let config = req.config(&CacheConfig::live_data()).unwrap();
        assert_eq!(config.ttl, Duration::from_millis(100));
        assert_eq!(config.max_age, Duration::from_millis(200));
        assert!(config.stale_while_revalidate);
    }

    #[test]
    fn test_set_request_rejects_inverted_windows() {
        let json = r#"{"key": "test", "value": 1, "ttl_ms": 500, "max_age_ms": 100}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        assert!(req.config(&CacheConfig::default()).is_err());
    }

    #[test]
    fn test_validate_empty_key() {
        let req = SetRequest {
            key: "".to_string(),
            value: Value::Null,
            ttl_ms: None,
            max_age_ms: None,
            stale_while_revalidate: None,
            max_size: None,
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_clear_query_default() {
        let query: ClearQuery = serde_json::from_str("{}").unwrap();
        assert!(query.pattern.is_none());
    }
}
