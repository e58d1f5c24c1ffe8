use serde::Serialize;
use thiserror::Error;

use crate::api::ApiError;

/// Failure recorded on a cache entry and handed to every coalesced reader.
///
/// Unlike `anyhow::Error` this is `Clone`, so one fetch outcome can be
/// broadcast to all readers waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CacheError {
    #[error("{}", transport_message(.status, .message))]
    Transport { status: Option<u16>, message: String },

    #[error("Validation failed: {0}")]
    Validation(String),
}

fn transport_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("Request failed ({}): {}", status, message),
        None => format!("Request failed: {}", message),
    }
}

impl CacheError {
    /// HTTP-like status, when the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            CacheError::Transport { status, .. } => *status,
            CacheError::Validation(_) => Some(422),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Whether a caller's retry policy may re-issue the read.
    /// Network failures, timeouts, rate limits and server errors qualify;
    /// rejected or missing resources do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            CacheError::Validation(_) => false,
            CacheError::Transport { status: None, .. } => true,
            CacheError::Transport {
                status: Some(status),
                ..
            } => matches!(status, 408 | 429 | 500..=599),
        }
    }

    /// Classify an adapter failure. The error chain is searched for an
    /// `ApiError` or a `reqwest::Error` so context added on the way up does
    /// not hide the status.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{:#}", err);
        for cause in err.chain() {
            if let Some(api) = cause.downcast_ref::<ApiError>() {
                return Self::from_api(api, message);
            }
            if let Some(http) = cause.downcast_ref::<reqwest::Error>() {
                return CacheError::Transport {
                    status: http.status().map(|s| s.as_u16()),
                    message,
                };
            }
        }
        CacheError::Transport {
            status: None,
            message,
        }
    }

    fn from_api(api: &ApiError, message: String) -> Self {
        match api {
            ApiError::Validation(reason) => CacheError::Validation(reason.clone()),
            other => CacheError::Transport {
                status: other.status(),
                message,
            },
        }
    }
}

impl From<anyhow::Error> for CacheError {
    fn from(err: anyhow::Error) -> Self {
        Self::from_anyhow(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_classifies_api_error_through_context() {
        let err: anyhow::Result<()> = Err(ApiError::NotFound("project 7".to_string()).into());
        let err = err.context("Failed to fetch project").unwrap_err();

        let cache_err = CacheError::from_anyhow(&err);
        assert_eq!(cache_err.status(), Some(404));
        assert!(cache_err.is_not_found());
        assert!(!cache_err.is_retryable());
        assert!(cache_err.to_string().contains("Failed to fetch project"));
    }

    #[test]
    fn test_validation_is_not_retryable() {
        let err = anyhow::Error::from(ApiError::Validation("hours must be positive".to_string()));
        let cache_err = CacheError::from(err);
        assert_eq!(
            cache_err,
            CacheError::Validation("hours must be positive".to_string())
        );
        assert!(!cache_err.is_retryable());
    }

    #[test]
    fn test_plain_error_is_retryable_transport() {
        let cache_err = CacheError::from(anyhow::anyhow!("connection reset"));
        assert_eq!(cache_err.status(), None);
        assert!(cache_err.is_retryable());
        assert_eq!(cache_err.to_string(), "Request failed: connection reset");
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let err = anyhow::Error::from(ApiError::ServerError("boom".to_string()));
        assert!(CacheError::from(err).is_retryable());

        let err = anyhow::Error::from(ApiError::RateLimited);
        assert!(CacheError::from(err).is_retryable());
    }
}
