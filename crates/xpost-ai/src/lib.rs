//! AI metadata generation.
//!
//! A `TextCompletion` seam over OpenAI, Anthropic and Gemini, with per-field
//! provider selection, retry with backoff, and bounded outputs.

pub mod error;
pub mod generate;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod retry;

pub use error::{AiError, AiResult};
pub use generate::{build_prompt, parse_list, GenerationOutcome, GeneratorConfig, MetadataGenerator};
pub use provider::{CompletionRequest, TextCompletion};
pub use registry::ProviderRegistry;
pub use retry::{with_retry, RetryConfig};
