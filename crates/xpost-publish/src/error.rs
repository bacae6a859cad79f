//! Publish error taxonomy.
//!
//! Errors split three ways: credential problems (the user must reconnect
//! the account), transient failures (worth retrying), and permanent
//! rejections (the platform refused the content).

use thiserror::Error;

pub type PublishResult<T> = Result<T, PublishError>;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("{platform} credentials invalid: {message}; reconnect the {platform} account to continue")]
    Credential { platform: String, message: String },

    #[error("{platform} request failed: {message}")]
    Transient { platform: String, message: String },

    #[error("{platform} rejected the publish ({status}): {body}")]
    Rejected {
        platform: String,
        status: u16,
        body: String,
    },

    #[error("{platform} processing did not finish after {attempts} checks")]
    ProcessingTimeout { platform: String, attempts: u32 },

    #[error("{platform} returned an unusable response: {message}")]
    BadResponse { platform: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PublishError {
    pub fn credential(platform: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Credential {
            platform: platform.into(),
            message: message.into(),
        }
    }

    pub fn transient(platform: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            platform: platform.into(),
            message: message.into(),
        }
    }

    pub fn bad_response(platform: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadResponse {
            platform: platform.into(),
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status onto the taxonomy: 401/403 are
    /// credential failures, 429 and 5xx transient, the rest rejections.
    pub fn from_status(platform: &str, status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Credential {
                platform: platform.to_string(),
                message: format!("{}: {}", status, body),
            },
            429 => Self::Transient {
                platform: platform.to_string(),
                message: format!("rate limited: {}", body),
            },
            s if s >= 500 => Self::Transient {
                platform: platform.to_string(),
                message: format!("{}: {}", s, body),
            },
            s => Self::Rejected {
                platform: platform.to_string(),
                status: s,
                body,
            },
        }
    }

    /// Whether a retry might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PublishError::Transient { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            PublishError::from_status("youtube", 401, String::new()),
            PublishError::Credential { .. }
        ));
        assert!(PublishError::from_status("youtube", 429, String::new()).is_retryable());
        assert!(PublishError::from_status("youtube", 503, String::new()).is_retryable());
        assert!(matches!(
            PublishError::from_status("instagram", 400, String::new()),
            PublishError::Rejected { .. }
        ));
        assert!(!PublishError::from_status("instagram", 400, String::new()).is_retryable());
    }

    #[test]
    fn test_credential_error_tells_user_to_reconnect() {
        let err = PublishError::from_status("youtube", 401, "token expired".into());
        let text = err.to_string();
        assert!(text.contains("reconnect the youtube account"), "{}", text);
    }
}
