//! Anthropic messages client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use xpost_models::ProviderId;

use crate::error::{AiError, AiResult};
use crate::provider::{status_error, CompletionRequest, TextCompletion};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicProvider {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TextCompletion for AnthropicProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    async fn complete(&self, request: &CompletionRequest) -> AiResult<String> {
        let url = format!("{}/v1/messages", self.base_url);

        let body = MessagesRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            messages: vec![Message {
                role: "user",
                content: request.prompt.clone(),
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &request.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::request_failed("anthropic", e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error("anthropic", response).await);
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AiError::request_failed("anthropic", e.to_string()))?;

        parsed
            .content
            .into_iter()
            .find_map(|b| b.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or(AiError::EmptyResponse {
                provider: "anthropic".to_string(),
            })
    }
}
