//! Metadata generation.
//!
//! Writes the four platform-metadata fields from the uploaded video's brief.
//! Each field is generated by its own configured provider/model; title and
//! description failures are fatal, keyword and hashtag failures degrade to
//! empty lists with a recorded warning.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use xpost_models::{ContentField, FieldProvider, GeneratedContent, ProviderConfig};

use crate::error::{AiError, AiResult};
use crate::provider::{strip_code_fences, CompletionRequest};
use crate::registry::ProviderRegistry;
use crate::retry::{with_retry, RetryConfig};

const MAX_TITLE_CHARS: usize = 100;
const MAX_DESCRIPTION_CHARS: usize = 5000;
const MAX_LIST_ITEMS: usize = 30;

/// Generation settings.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Per-call deadline, applied around each provider attempt
    pub timeout_secs: u64,
    pub retry: RetryConfig,
    pub max_tokens: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            retry: RetryConfig::default(),
            max_tokens: 1024,
        }
    }
}

/// Generated metadata plus non-fatal caveats.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub content: GeneratedContent,
    pub warnings: Vec<String>,
}

/// Drives the four per-field completions for one job.
pub struct MetadataGenerator {
    registry: Arc<ProviderRegistry>,
    config: GeneratorConfig,
}

impl MetadataGenerator {
    pub fn new(registry: Arc<ProviderRegistry>, config: GeneratorConfig) -> Self {
        Self { registry, config }
    }

    /// Generate all four fields concurrently.
    ///
    /// Title or description failure aborts generation; keywords or hashtags
    /// fall back to an empty list and a warning.
    pub async fn generate(
        &self,
        brief: &str,
        providers: &ProviderConfig,
    ) -> AiResult<GenerationOutcome> {
        let (title, description, keywords, hashtags) = tokio::join!(
            self.generate_field(ContentField::Title, brief, &providers.title),
            self.generate_field(ContentField::Description, brief, &providers.description),
            self.generate_field(ContentField::Keywords, brief, &providers.keywords),
            self.generate_field(ContentField::Hashtags, brief, &providers.hashtags),
        );

        let title = clamp_text(&title?, MAX_TITLE_CHARS);
        let description = clamp_text(&description?, MAX_DESCRIPTION_CHARS);

        let mut warnings = Vec::new();
        let keywords = match keywords {
            Ok(text) => parse_list(&text),
            Err(e) => {
                warn!("keyword generation failed, continuing without: {}", e);
                warnings.push(format!("keywords unavailable: {}", e));
                Vec::new()
            }
        };
        let hashtags = match hashtags {
            Ok(text) => parse_list(&text),
            Err(e) => {
                warn!("hashtag generation failed, continuing without: {}", e);
                warnings.push(format!("hashtags unavailable: {}", e));
                Vec::new()
            }
        };

        info!(
            keywords = keywords.len(),
            hashtags = hashtags.len(),
            "metadata generated"
        );

        Ok(GenerationOutcome {
            content: GeneratedContent {
                title,
                description,
                keywords,
                hashtags,
            },
            warnings,
        })
    }

    async fn generate_field(
        &self,
        field: ContentField,
        brief: &str,
        provider: &FieldProvider,
    ) -> AiResult<String> {
        let api_key = self.registry.resolve_key(provider)?;
        let backend = self.registry.get(provider.provider);

        let request = CompletionRequest {
            model: provider.model.clone(),
            api_key,
            prompt: build_prompt(field, brief),
            max_tokens: self.config.max_tokens,
        };

        let timeout = self.config.timeout_secs;
        with_retry(&self.config.retry, field.as_str(), || {
            let backend = backend.clone();
            let request = request.clone();
            async move {
                tokio::time::timeout(Duration::from_secs(timeout), backend.complete(&request))
                    .await
                    .map_err(|_| AiError::Timeout(timeout))?
            }
        })
        .await
    }
}

/// Build the prompt for one field.
pub fn build_prompt(field: ContentField, brief: &str) -> String {
    let instruction = match field {
        ContentField::Title => {
            "Write ONE short, catchy video title (under 90 characters). \
             Return only the title text, no quotes, no markdown."
        }
        ContentField::Description => {
            "Write an engaging video description of 2-4 sentences suitable \
             for both Instagram and YouTube. Return only the description text."
        }
        ContentField::Keywords => {
            "List 10-15 search keywords for this video, one per line. \
             Return only the keywords, no numbering, no extra text."
        }
        ContentField::Hashtags => {
            "List 10-15 social media hashtags for this video, one per line, \
             without the leading '#'. Return only the hashtags."
        }
    };

    format!("VIDEO BRIEF:\n{}\n\nTASK:\n{}", brief.trim(), instruction)
}

fn clamp_text(text: &str, max_chars: usize) -> String {
    let text = strip_code_fences(text).trim_matches('"').trim();
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect::<String>().trim_end().to_string()
    }
}

/// Parse a model's list output: one item per line or comma-separated,
/// tolerating bullets, numbering and leading '#'.
pub fn parse_list(text: &str) -> Vec<String> {
    let text = strip_code_fences(text);
    let mut seen = std::collections::HashSet::new();
    let mut items = Vec::new();

    for raw in text.split(['\n', ',']) {
        let item = raw
            .trim()
            .trim_start_matches(['-', '*', '#'])
            .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')')
            .trim();
        if item.is_empty() {
            continue;
        }
        if seen.insert(item.to_lowercase()) {
            items.push(item.to_string());
        }
        if items.len() >= MAX_LIST_ITEMS {
            break;
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::TextCompletion;
    use async_trait::async_trait;
    use xpost_models::ProviderId;

    struct StubProvider {
        id: ProviderId,
        response: Result<String, String>,
    }

    #[async_trait]
    impl TextCompletion for StubProvider {
        fn id(&self) -> ProviderId {
            self.id
        }

        async fn complete(&self, _request: &CompletionRequest) -> AiResult<String> {
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(msg) => Err(AiError::HttpStatus {
                    provider: self.id.to_string(),
                    status: 400,
                    body: msg.clone(),
                    retry_after_ms: None,
                }),
            }
        }
    }

    fn registry(
        openai: Result<&str, &str>,
        anthropic: Result<&str, &str>,
        gemini: Result<&str, &str>,
    ) -> Arc<ProviderRegistry> {
        let wrap = |id, r: Result<&str, &str>| {
            Arc::new(StubProvider {
                id,
                response: r.map(String::from).map_err(String::from),
            }) as Arc<dyn TextCompletion>
        };
        Arc::new(ProviderRegistry::with_providers(
            wrap(ProviderId::Openai, openai),
            wrap(ProviderId::Anthropic, anthropic),
            wrap(ProviderId::Gemini, gemini),
        ))
    }

    fn keyed_config(provider: ProviderId, model: &str) -> ProviderConfig {
        let mut config = ProviderConfig::uniform(provider, model);
        for field in [
            &mut config.title,
            &mut config.description,
            &mut config.keywords,
            &mut config.hashtags,
        ] {
            field.api_key = Some("test-key".into());
        }
        config
    }

    fn fast_generator(registry: Arc<ProviderRegistry>) -> MetadataGenerator {
        MetadataGenerator::new(
            registry,
            GeneratorConfig {
                timeout_secs: 5,
                retry: RetryConfig {
                    max_retries: 0,
                    base_delay_ms: 1,
                    max_delay_ms: 1,
                },
                max_tokens: 256,
            },
        )
    }

    #[test]
    fn test_parse_list_formats() {
        assert_eq!(parse_list("alpha\nbeta\ngamma"), vec!["alpha", "beta", "gamma"]);
        assert_eq!(parse_list("- one\n- two"), vec!["one", "two"]);
        assert_eq!(parse_list("1. first\n2. second"), vec!["first", "second"]);
        assert_eq!(parse_list("#tag1, #tag2, #Tag1"), vec!["tag1", "tag2"]);
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_clamp_text_strips_wrapping() {
        assert_eq!(clamp_text("\"Quoted Title\"", 100), "Quoted Title");
        let long = "x".repeat(200);
        assert_eq!(clamp_text(&long, 100).chars().count(), 100);
    }

    #[test]
    fn test_prompt_includes_brief() {
        let prompt = build_prompt(ContentField::Title, "a launch video");
        assert!(prompt.contains("a launch video"));
        assert!(prompt.contains("title"));
    }

    #[tokio::test]
    async fn test_generate_all_fields() {
        let registry = registry(
            Ok("My Title\nignored"),
            Err("unused"),
            Err("unused"),
        );
        let generator = fast_generator(registry);

        let outcome = generator
            .generate("brief", &keyed_config(ProviderId::Openai, "gpt-4o-mini"))
            .await
            .unwrap();

        assert_eq!(outcome.content.title, "My Title\nignored");
        assert!(outcome.warnings.is_empty());
        assert!(!outcome.content.keywords.is_empty());
    }

    #[tokio::test]
    async fn test_list_field_failure_degrades() {
        // Title/description on openai succeed, lists on gemini fail
        let registry = registry(Ok("fine"), Err("unused"), Err("quota exceeded"));
        let mut config = keyed_config(ProviderId::Openai, "gpt-4o-mini");
        config.keywords.provider = ProviderId::Gemini;
        config.hashtags.provider = ProviderId::Gemini;

        let generator = fast_generator(registry);
        let outcome = generator.generate("brief", &config).await.unwrap();

        assert!(outcome.content.keywords.is_empty());
        assert!(outcome.content.hashtags.is_empty());
        assert_eq!(outcome.warnings.len(), 2);
    }

    #[tokio::test]
    async fn test_title_failure_is_fatal() {
        let registry = registry(Err("bad request"), Err("unused"), Err("unused"));
        let generator = fast_generator(registry);

        let result = generator
            .generate("brief", &keyed_config(ProviderId::Openai, "gpt-4o-mini"))
            .await;
        assert!(result.is_err());
    }
}
