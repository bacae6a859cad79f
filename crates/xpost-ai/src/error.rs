//! AI provider error types.

use thiserror::Error;

pub type AiResult<T> = Result<T, AiError>;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API key missing for provider {0}")]
    MissingApiKey(String),

    #[error("{provider} request failed: {message}")]
    RequestFailed { provider: String, message: String },

    #[error("{provider} returned {status}: {body}")]
    HttpStatus {
        provider: String,
        status: u16,
        body: String,
        retry_after_ms: Option<u64>,
    },

    #[error("{provider} returned no content")]
    EmptyResponse { provider: String },

    #[error("Generation timed out after {0} seconds")]
    Timeout(u64),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AiError {
    pub fn request_failed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether a retry might succeed. Network failures, rate limits and
    /// server errors are transient; everything else is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AiError::RequestFailed { .. } => true,
            AiError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Server-suggested wait before retrying, if the response carried one.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            AiError::HttpStatus { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AiError::request_failed("openai", "connection reset").is_retryable());
        assert!(AiError::HttpStatus {
            provider: "openai".into(),
            status: 429,
            body: String::new(),
            retry_after_ms: Some(1500),
        }
        .is_retryable());
        assert!(AiError::HttpStatus {
            provider: "openai".into(),
            status: 503,
            body: String::new(),
            retry_after_ms: None,
        }
        .is_retryable());
        assert!(!AiError::HttpStatus {
            provider: "openai".into(),
            status: 401,
            body: String::new(),
            retry_after_ms: None,
        }
        .is_retryable());
        assert!(!AiError::MissingApiKey("openai".into()).is_retryable());
    }
}
