//! Error types for the cache manager
//!
//! Provides unified error handling using thiserror.

use std::fmt;
use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Fetch Error ==
/// Failure reported by a caller-supplied fetcher.
///
/// Shared between every caller waiting on the same flight, so the original
/// error lives behind an `Arc`. Display, Debug and `source()` all forward to
/// the original error; use [`FetchError::downcast_ref`] to recover its type.
#[derive(Clone)]
pub struct FetchError(Arc<anyhow::Error>);

impl FetchError {
    /// Wraps whatever the fetcher returned.
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self(Arc::new(error.into()))
    }

    /// Returns the original error if it is of type `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Borrows the underlying error.
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl fmt::Debug for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        (**self.0).source()
    }
}

// == Cache Error Enum ==
/// Unified error type for the cache manager.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// The fetcher failed and no fallback was allowed or available
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The flight was aborted before it completed
    #[error("Fetch for '{0}' was cancelled")]
    Cancelled(String),

    /// Value exceeds a byte ceiling and was not stored
    #[error("Entry '{key}' is {size} bytes, exceeding the limit of {limit} bytes")]
    EntryTooLarge {
        key: String,
        size: usize,
        limit: usize,
    },

    /// Value could not be serialized to estimate its size
    #[error("Failed to serialize value for '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// Config violates `max_age >= ttl`
    #[error("Invalid cache config: {0}")]
    InvalidConfig(String),

    /// Key pattern failed to compile
    #[error("Invalid key pattern: {0}")]
    InvalidPattern(String),

    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CacheError {
    pub(crate) fn serialization(key: &str, source: serde_json::Error) -> Self {
        CacheError::Serialization {
            key: key.to_string(),
            source: Arc::new(source),
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_)
            | CacheError::InvalidConfig(_)
            | CacheError::InvalidPattern(_)
            | CacheError::Serialization { .. } => StatusCode::BAD_REQUEST,
            CacheError::EntryTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            CacheError::Fetch(_) => StatusCode::BAD_GATEWAY,
            CacheError::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache manager.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_fetch_error_displays_original_message() {
        let err = FetchError::new(io::Error::new(io::ErrorKind::TimedOut, "upstream timed out"));
        assert_eq!(err.to_string(), "upstream timed out");

        let wrapped = CacheError::from(err);
        assert_eq!(wrapped.to_string(), "upstream timed out");
    }

    #[test]
    fn test_fetch_error_downcast_recovers_type() {
        let err = FetchError::new(io::Error::new(io::ErrorKind::NotFound, "gone"));

        let io_err = err.downcast_ref::<io::Error>().unwrap();
        assert_eq!(io_err.kind(), io::ErrorKind::NotFound);
        assert!(err.downcast_ref::<serde_json::Error>().is_none());
    }

    #[test]
    fn test_fetch_error_clones_share_inner() {
        let err = FetchError::new(anyhow::anyhow!("boom"));
        let copy = err.clone();
        assert!(std::ptr::eq(err.inner(), copy.inner()));
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (CacheError::NotFound("k".into()), StatusCode::NOT_FOUND),
            (CacheError::InvalidPattern("(".into()), StatusCode::BAD_REQUEST),
            (
                CacheError::EntryTooLarge {
                    key: "k".into(),
                    size: 10,
                    limit: 5,
                },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                CacheError::Fetch(FetchError::new(anyhow::anyhow!("down"))),
                StatusCode::BAD_GATEWAY,
            ),
            (CacheError::Cancelled("k".into()), StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
