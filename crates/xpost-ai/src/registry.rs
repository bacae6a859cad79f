//! Provider lookup and credential resolution.

use std::sync::Arc;

use reqwest::Client;

use xpost_models::{FieldProvider, ProviderId};

use crate::error::{AiError, AiResult};
use crate::provider::TextCompletion;
use crate::providers::{AnthropicProvider, GeminiProvider, OpenAiProvider};

/// All supported completion backends behind one HTTP client.
pub struct ProviderRegistry {
    openai: Arc<dyn TextCompletion>,
    anthropic: Arc<dyn TextCompletion>,
    gemini: Arc<dyn TextCompletion>,
}

impl ProviderRegistry {
    /// Build the registry with the standard providers.
    pub fn new(client: Client) -> Self {
        Self {
            openai: Arc::new(OpenAiProvider::new(client.clone())),
            anthropic: Arc::new(AnthropicProvider::new(client.clone())),
            gemini: Arc::new(GeminiProvider::new(client)),
        }
    }

    /// Build with explicit providers, for tests.
    pub fn with_providers(
        openai: Arc<dyn TextCompletion>,
        anthropic: Arc<dyn TextCompletion>,
        gemini: Arc<dyn TextCompletion>,
    ) -> Self {
        Self {
            openai,
            anthropic,
            gemini,
        }
    }

    /// Backend for a provider.
    pub fn get(&self, id: ProviderId) -> Arc<dyn TextCompletion> {
        match id {
            ProviderId::Openai => self.openai.clone(),
            ProviderId::Anthropic => self.anthropic.clone(),
            ProviderId::Gemini => self.gemini.clone(),
        }
    }

    /// Resolve the API key for a field: the caller-supplied key wins,
    /// otherwise the provider's environment default.
    pub fn resolve_key(&self, field: &FieldProvider) -> AiResult<String> {
        if let Some(ref key) = field.api_key {
            let key = key.trim();
            if !key.is_empty() {
                return Ok(key.to_string());
            }
        }

        let var = match field.provider {
            ProviderId::Openai => "OPENAI_API_KEY",
            ProviderId::Anthropic => "ANTHROPIC_API_KEY",
            ProviderId::Gemini => "GEMINI_API_KEY",
        };
        std::env::var(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim().to_string())
            .ok_or_else(|| AiError::MissingApiKey(field.provider.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_key_wins_over_env() {
        let registry = ProviderRegistry::new(Client::new());
        let field = FieldProvider {
            provider: ProviderId::Openai,
            model: "gpt-4o-mini".into(),
            api_key: Some("  sk-explicit  ".into()),
        };
        assert_eq!(registry.resolve_key(&field).unwrap(), "sk-explicit");
    }

    #[test]
    fn test_missing_key_is_an_error() {
        std::env::remove_var("ANTHROPIC_API_KEY");
        let registry = ProviderRegistry::new(Client::new());
        let field = FieldProvider::new(ProviderId::Anthropic, "claude-sonnet");
        assert!(matches!(
            registry.resolve_key(&field),
            Err(AiError::MissingApiKey(_))
        ));
    }
}
