//! Service seams between the orchestrator and its backends.
//!
//! Each external concern sits behind a small trait so the pipeline's
//! control flow can be exercised without FFmpeg, object storage, Redis or
//! the platform APIs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use xpost_ai::{GenerationOutcome, MetadataGenerator};
use xpost_media::convert_for_platform;
use xpost_models::{JobId, Platform, ProgressEvent, ProviderConfig};
use xpost_progress::ProgressChannel;
use xpost_storage::MediaStore;

use crate::error::PipelineResult;

/// Moves media between the object store and the local work directory.
#[async_trait]
pub trait MediaRepository: Send + Sync {
    async fn fetch_source(&self, object_key: &str, dest: &Path) -> PipelineResult<()>;
    async fn store_render(&self, local: &Path, object_key: &str) -> PipelineResult<()>;
    /// Time-limited public URL for a stored render.
    async fn presign(&self, object_key: &str) -> PipelineResult<String>;
}

/// One platform transcode.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Transcode `source` for `platform` into `out_dir`, reporting encode
    /// percentages through `progress`.
    async fn transcode(
        &self,
        source: &Path,
        out_dir: &Path,
        platform: Platform,
        progress: UnboundedSender<(Platform, u8)>,
    ) -> PipelineResult<TranscodeOutput>;
}

/// A finished transcode.
#[derive(Debug, Clone)]
pub struct TranscodeOutput {
    pub path: PathBuf,
    /// Non-fatal caveat, e.g. source duration over the platform ceiling
    pub duration_warning: Option<String>,
}

/// AI metadata generation.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn generate(
        &self,
        brief: &str,
        providers: &ProviderConfig,
    ) -> PipelineResult<GenerationOutcome>;
}

/// Best-effort progress event delivery.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Deliver one event. Failures are swallowed; progress is advisory and
    /// never blocks the job.
    async fn send(&self, job_id: &JobId, event: &ProgressEvent);
}

/// Production repository over the S3-compatible store.
pub struct StorageRepository {
    store: MediaStore,
    presign_ttl: Duration,
}

impl StorageRepository {
    pub fn new(store: MediaStore, presign_ttl: Duration) -> Self {
        Self { store, presign_ttl }
    }
}

#[async_trait]
impl MediaRepository for StorageRepository {
    async fn fetch_source(&self, object_key: &str, dest: &Path) -> PipelineResult<()> {
        self.store.download_file(object_key, dest).await?;
        Ok(())
    }

    async fn store_render(&self, local: &Path, object_key: &str) -> PipelineResult<()> {
        self.store.upload_file(local, object_key, "video/mp4").await?;
        Ok(())
    }

    async fn presign(&self, object_key: &str) -> PipelineResult<String> {
        Ok(self.store.presign_get(object_key, self.presign_ttl).await?)
    }
}

/// Production transcoder over the FFmpeg wrapper.
pub struct FfmpegTranscoder;

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        source: &Path,
        out_dir: &Path,
        platform: Platform,
        progress: UnboundedSender<(Platform, u8)>,
    ) -> PipelineResult<TranscodeOutput> {
        let outcome = convert_for_platform(source, out_dir, &platform.spec(), move |pct| {
            let _ = progress.send((platform, pct));
        })
        .await?;

        Ok(TranscodeOutput {
            path: outcome.output,
            duration_warning: outcome.duration_warning,
        })
    }
}

/// Production metadata source over the provider registry.
pub struct AiMetadataSource {
    generator: MetadataGenerator,
}

impl AiMetadataSource {
    pub fn new(generator: MetadataGenerator) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl MetadataSource for AiMetadataSource {
    async fn generate(
        &self,
        brief: &str,
        providers: &ProviderConfig,
    ) -> PipelineResult<GenerationOutcome> {
        Ok(self.generator.generate(brief, providers).await?)
    }
}

/// Production sink over the Redis broadcast channel.
pub struct RedisProgressSink {
    channel: ProgressChannel,
}

impl RedisProgressSink {
    pub fn new(channel: ProgressChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ProgressSink for RedisProgressSink {
    async fn send(&self, job_id: &JobId, event: &ProgressEvent) {
        if let Err(e) = self.channel.publish(job_id, event).await {
            warn!(job_id = %job_id, "failed to publish progress event: {}", e);
        }
    }
}
