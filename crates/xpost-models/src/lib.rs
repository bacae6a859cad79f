//! Shared data models for the CrossPost backend.
//!
//! This crate provides Serde-serializable types for:
//! - Publish jobs, per-platform sub-state and the step progress log
//! - Target platforms and their encoding specs
//! - AI provider configuration and generated content
//! - Tag sanitization rules
//! - WebSocket progress event schemas

pub mod content;
pub mod job;
pub mod platform;
pub mod tags;
pub mod ws;

// Re-export common types
pub use content::{ContentField, FieldProvider, GeneratedContent, ProviderConfig, ProviderId};
pub use job::{JobId, JobStatus, PlatformState, PlatformStatus, PublishJob, SourceAsset, StepRecord, StepStatus};
pub use platform::{Platform, PlatformSpec};
pub use tags::{sanitize_tags, TagLimits};
pub use ws::{ProgressEvent, WsSubscribeRequest};
