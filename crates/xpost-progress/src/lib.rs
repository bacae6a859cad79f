//! Real-time progress broadcast.
//!
//! Fire-and-forget fan-out over Redis Pub/Sub, one channel per job. There is
//! no replay: a subscriber only sees events published after it attached, and
//! must read the job document for anything earlier.

use redis::AsyncCommands;
use thiserror::Error;
use tracing::debug;

use xpost_models::{JobId, JobStatus, Platform, ProgressEvent, StepStatus};

pub type ProgressResult<T> = Result<T, ProgressError>;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Channel for publishing and subscribing to a job's progress events.
pub struct ProgressChannel {
    client: redis::Client,
}

impl ProgressChannel {
    /// Create a new progress channel.
    pub fn new(redis_url: &str) -> ProgressResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Create from environment variables.
    pub fn from_env() -> ProgressResult<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        Self::new(&url)
    }

    /// Redis channel name for a job.
    pub fn channel_name(job_id: &JobId) -> String {
        format!("progress:{}", job_id)
    }

    /// Publish an event to a job's channel.
    ///
    /// Delivery is best-effort; a job proceeds even if nobody listens.
    pub async fn publish(&self, job_id: &JobId, event: &ProgressEvent) -> ProgressResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::channel_name(job_id);
        let payload = serde_json::to_string(event)?;

        debug!("publishing progress event to {}", channel);
        conn.publish::<_, _, ()>(channel, payload).await?;

        Ok(())
    }

    /// Publish a step update.
    pub async fn step(
        &self,
        job_id: &JobId,
        step: &str,
        status: StepStatus,
        percentage: u8,
        message: impl Into<String>,
    ) -> ProgressResult<()> {
        self.publish(job_id, &ProgressEvent::step(step, status, percentage, message))
            .await
    }

    /// Publish a platform success.
    pub async fn platform_published(
        &self,
        job_id: &JobId,
        platform: Platform,
        external_id: &str,
        external_url: &str,
    ) -> ProgressResult<()> {
        self.publish(
            job_id,
            &ProgressEvent::platform_published(platform, external_id, external_url),
        )
        .await
    }

    /// Publish a platform failure.
    pub async fn platform_failed(
        &self,
        job_id: &JobId,
        platform: Platform,
        error: impl Into<String>,
    ) -> ProgressResult<()> {
        self.publish(job_id, &ProgressEvent::platform_failed(platform, error))
            .await
    }

    /// Publish the terminal event.
    pub async fn job_finished(&self, job_id: &JobId, status: JobStatus) -> ProgressResult<()> {
        self.publish(job_id, &ProgressEvent::job_finished(job_id.clone(), status))
            .await
    }

    /// Subscribe to a job's events. Returns a pinned stream to poll with
    /// `.next()`; malformed payloads are dropped.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
    ) -> ProgressResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = ProgressEvent> + Send>>>
    {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        let channel = Self::channel_name(job_id);

        pubsub.subscribe(&channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_name_uses_job_id() {
        let job_id = JobId::from_string("abc-123");
        assert_eq!(ProgressChannel::channel_name(&job_id), "progress:abc-123");
    }

    #[test]
    fn test_event_payload_round_trips() {
        let event = ProgressEvent::step("generate", StepStatus::Running, 40, "Writing metadata");
        let payload = serde_json::to_string(&event).unwrap();
        let back: ProgressEvent = serde_json::from_str(&payload).unwrap();
        assert!(matches!(back, ProgressEvent::Step { percentage: 40, .. }));
    }
}
