//! Publisher seam.

use std::path::PathBuf;

use async_trait::async_trait;

use xpost_models::{GeneratedContent, Platform};

use crate::error::PublishResult;

/// Everything a platform adapter needs to publish one rendered video.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// Owner whose linked account receives the post
    pub owner_id: String,
    /// Local path of the platform-specific render
    pub video_path: PathBuf,
    /// Time-limited public URL of the same render, for platforms that
    /// fetch instead of accepting an upload
    pub video_url: String,
    /// AI-written metadata
    pub content: GeneratedContent,
}

/// Successful publish outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMedia {
    /// Platform-side media/video ID
    pub external_id: String,
    /// Public URL of the post
    pub external_url: String,
}

/// One platform's publish flow.
#[async_trait]
pub trait PlatformPublisher: Send + Sync {
    /// Which platform this publishes to.
    fn platform(&self) -> Platform;

    /// Publish one video. Implementations retry their own transient
    /// failures; a returned error is final for this job.
    async fn publish(&self, request: &PublishRequest) -> PublishResult<PublishedMedia>;
}
