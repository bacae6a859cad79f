//! AI provider configuration and generated metadata.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the four AI-written metadata fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContentField {
    Title,
    Description,
    Keywords,
    Hashtags,
}

impl ContentField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentField::Title => "title",
            ContentField::Description => "description",
            ContentField::Keywords => "keywords",
            ContentField::Hashtags => "hashtags",
        }
    }

    pub fn all() -> [ContentField; 4] {
        [
            ContentField::Title,
            ContentField::Description,
            ContentField::Keywords,
            ContentField::Hashtags,
        ]
    }

    /// Whether the field produces a list rather than a single text.
    pub fn is_list(&self) -> bool {
        matches!(self, ContentField::Keywords | ContentField::Hashtags)
    }
}

impl fmt::Display for ContentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A supported AI text provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    Openai,
    Anthropic,
    Gemini,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Openai => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderId::Openai),
            "anthropic" => Ok(ProviderId::Anthropic),
            "gemini" => Ok(ProviderId::Gemini),
            other => Err(format!("unsupported provider: {}", other)),
        }
    }
}

/// Provider selection for a single metadata field.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FieldProvider {
    /// Backing provider
    pub provider: ProviderId,
    /// Model identifier passed through to the provider
    pub model: String,
    /// Caller-supplied credential; the project-level default is used when
    /// omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl FieldProvider {
    pub fn new(provider: ProviderId, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            api_key: None,
        }
    }
}

/// Per-field provider configuration for one job.
///
/// Each of the four fields may use a different provider/model/key.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProviderConfig {
    pub title: FieldProvider,
    pub description: FieldProvider,
    pub keywords: FieldProvider,
    pub hashtags: FieldProvider,
}

impl ProviderConfig {
    /// Use one provider/model for all four fields.
    pub fn uniform(provider: ProviderId, model: impl Into<String>) -> Self {
        let fp = FieldProvider::new(provider, model);
        Self {
            title: fp.clone(),
            description: fp.clone(),
            keywords: fp.clone(),
            hashtags: fp,
        }
    }

    /// Provider selection for a given field.
    pub fn for_field(&self, field: ContentField) -> &FieldProvider {
        match field {
            ContentField::Title => &self.title,
            ContentField::Description => &self.description,
            ContentField::Keywords => &self.keywords,
            ContentField::Hashtags => &self.hashtags,
        }
    }
}

/// AI-written metadata, populated once generation succeeds and immutable
/// afterward.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GeneratedContent {
    pub title: String,
    pub description: String,
    /// Ordered keyword list
    pub keywords: Vec<String>,
    /// Ordered hashtag list (no leading '#')
    pub hashtags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!("openai".parse::<ProviderId>().unwrap(), ProviderId::Openai);
        assert_eq!("Gemini".parse::<ProviderId>().unwrap(), ProviderId::Gemini);
        assert!("llama-at-home".parse::<ProviderId>().is_err());
    }

    #[test]
    fn test_uniform_config() {
        let config = ProviderConfig::uniform(ProviderId::Anthropic, "claude-sonnet-4-5");
        for field in ContentField::all() {
            assert_eq!(config.for_field(field).provider, ProviderId::Anthropic);
            assert!(config.for_field(field).api_key.is_none());
        }
    }

    #[test]
    fn test_field_kinds() {
        assert!(!ContentField::Title.is_list());
        assert!(ContentField::Hashtags.is_list());
    }
}
