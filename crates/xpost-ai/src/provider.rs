//! Text-completion provider seam.

use async_trait::async_trait;
use reqwest::Response;

use xpost_models::ProviderId;

use crate::error::{AiError, AiResult};

/// One prompt sent to a provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub api_key: String,
    pub prompt: String,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
}

/// A chat/text completion backend.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    /// Which provider this is.
    fn id(&self) -> ProviderId;

    /// Run one completion and return the raw text.
    async fn complete(&self, request: &CompletionRequest) -> AiResult<String>;
}

/// Turn a non-success HTTP response into an error, capturing a
/// Retry-After hint when present.
pub(crate) async fn status_error(provider: &str, response: Response) -> AiError {
    let status = response.status().as_u16();
    let retry_after_ms = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(|secs| secs * 1000);
    let body = response.text().await.unwrap_or_default();

    AiError::HttpStatus {
        provider: provider.to_string(),
        status,
        body,
        retry_after_ms,
    }
}

/// Strip a markdown code fence wrapper if the model added one.
pub(crate) fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("plain text"), "plain text");
        assert_eq!(strip_code_fences("```json\n[\"a\"]\n```"), "[\"a\"]");
        assert_eq!(strip_code_fences("```\nhello\n```"), "hello");
    }
}
