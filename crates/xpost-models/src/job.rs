//! Publish job definitions.
//!
//! One `PublishJob` document per upload request. The document is created
//! synchronously when the upload is accepted, mutated exclusively by the
//! pipeline, and retained indefinitely for history/listing.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::content::{GeneratedContent, ProviderConfig};
use crate::platform::Platform;

/// Unique identifier for a publish job. Doubles as the broadcast channel
/// name for progress events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Overall job status.
///
/// Transitions only pending -> processing -> {completed|failed|partial};
/// terminal states are write-once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, pipeline not yet started
    #[default]
    Pending,
    /// Pipeline is running
    Processing,
    /// Both platform publishes succeeded
    Completed,
    /// Both platform publishes failed (or a job-fatal stage failed)
    Failed,
    /// Exactly one platform publish succeeded
    Partial,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Partial => "partial",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Partial
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-platform publish sub-status. Monotonic: processing never reverts to
/// pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlatformStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PlatformStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformStatus::Pending => "pending",
            PlatformStatus::Processing => "processing",
            PlatformStatus::Completed => "completed",
            PlatformStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PlatformStatus::Completed | PlatformStatus::Failed)
    }
}

/// Independent publish state for one platform.
///
/// The two sub-records of a job evolve independently and concurrently; each
/// publish stage writes only its own entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PlatformState {
    #[serde(default)]
    pub status: PlatformStatus,
    /// Platform-side media/video ID on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Public URL of the published post on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    /// Actionable error message on permanent failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl PlatformState {
    /// Mark the stage as running.
    pub fn start(&mut self) {
        if self.status == PlatformStatus::Pending {
            self.status = PlatformStatus::Processing;
        }
    }

    /// Record a successful publish.
    pub fn complete(&mut self, external_id: impl Into<String>, external_url: impl Into<String>) {
        self.status = PlatformStatus::Completed;
        self.external_id = Some(external_id.into());
        self.external_url = Some(external_url.into());
        self.published_at = Some(Utc::now());
        self.error = None;
    }

    /// Record a permanent failure.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = PlatformStatus::Failed;
        self.error = Some(error.into());
    }
}

/// Step outcome in the progress log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
    /// Step completed with a non-fatal caveat (e.g. duration over the
    /// platform ceiling)
    Warning,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Warning => "warning",
        }
    }
}

/// One entry in the append-only step audit trail. Entries are never mutated
/// once recorded as completed or failed.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepRecord {
    pub step: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reference to the uploaded video and the brief supplied with it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SourceAsset {
    /// Media store object key of the uploaded video
    pub object_key: String,
    /// Original filename as uploaded
    pub filename: String,
    /// Upload size in bytes
    pub size_bytes: u64,
    /// Free-text brief driving AI metadata generation
    pub brief: String,
}

/// A publish request, persisted as one document in the job store.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PublishJob {
    /// Unique job ID
    pub id: JobId,

    /// Owning user; all reads and writes are scoped to it
    pub owner_id: String,

    /// Overall status
    #[serde(default)]
    pub status: JobStatus,

    /// Uploaded video + brief
    pub source: SourceAsset,

    /// Per-field AI provider selection
    pub provider_config: ProviderConfig,

    /// AI-written metadata; written exactly once per job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_content: Option<GeneratedContent>,

    /// Instagram publish sub-state
    #[serde(default)]
    pub instagram: PlatformState,

    /// YouTube publish sub-state
    #[serde(default)]
    pub youtube: PlatformState,

    /// Append-only step audit trail
    #[serde(default)]
    pub progress_log: Vec<StepRecord>,

    /// Monotonically non-decreasing completion percentage
    #[serde(default)]
    pub overall_percentage: u8,

    /// First fatal error for a failed job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PublishJob {
    /// Create a new pending job.
    pub fn new(
        owner_id: impl Into<String>,
        source: SourceAsset,
        provider_config: ProviderConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            owner_id: owner_id.into(),
            status: JobStatus::Pending,
            source,
            provider_config,
            generated_content: None,
            instagram: PlatformState::default(),
            youtube: PlatformState::default(),
            progress_log: Vec::new(),
            overall_percentage: 0,
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Sub-state for a platform.
    pub fn platform(&self, platform: Platform) -> &PlatformState {
        match platform {
            Platform::Instagram => &self.instagram,
            Platform::Youtube => &self.youtube,
        }
    }

    /// Mutable sub-state for a platform.
    pub fn platform_mut(&mut self, platform: Platform) -> &mut PlatformState {
        match platform {
            Platform::Instagram => &mut self.instagram,
            Platform::Youtube => &mut self.youtube,
        }
    }

    /// Mark the job as processing.
    pub fn start(&mut self) {
        if self.status == JobStatus::Pending {
            self.status = JobStatus::Processing;
            self.started_at = Some(Utc::now());
            self.touch();
        }
    }

    /// Record generated metadata. Write-once: a second call is ignored.
    pub fn set_generated_content(&mut self, content: GeneratedContent) {
        if self.generated_content.is_none() {
            self.generated_content = Some(content);
            self.touch();
        }
    }

    /// Append a running step entry and return its name.
    pub fn begin_step(&mut self, step: impl Into<String>) -> String {
        let step = step.into();
        self.progress_log.push(StepRecord {
            step: step.clone(),
            status: StepStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        });
        self.touch();
        step
    }

    /// Close the most recent running entry for `step`.
    pub fn finish_step(&mut self, step: &str, status: StepStatus, error: Option<String>) {
        if let Some(record) = self
            .progress_log
            .iter_mut()
            .rev()
            .find(|r| r.step == step && r.status == StepStatus::Running)
        {
            record.status = status;
            record.completed_at = Some(Utc::now());
            record.error = error;
        }
        self.touch();
    }

    /// Raise the overall percentage. Never regresses, even on retry.
    pub fn advance_percentage(&mut self, value: u8) {
        let value = value.min(100);
        if value > self.overall_percentage {
            self.overall_percentage = value;
            self.touch();
        }
    }

    /// Terminal status implied by the two platform sub-states.
    ///
    /// Returns `None` while either stage is still unresolved.
    pub fn terminal_status(&self) -> Option<JobStatus> {
        let outcomes = [self.instagram.status, self.youtube.status];
        if outcomes.iter().any(|s| !s.is_terminal()) {
            return None;
        }
        let successes = outcomes
            .iter()
            .filter(|s| **s == PlatformStatus::Completed)
            .count();
        Some(match successes {
            2 => JobStatus::Completed,
            1 => JobStatus::Partial,
            _ => JobStatus::Failed,
        })
    }

    /// Move to a terminal status. Terminal states are write-once: once set,
    /// later calls are ignored.
    pub fn finalize(&mut self, status: JobStatus, error: Option<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        if self.error.is_none() {
            self.error = error;
        }
        self.completed_at = Some(Utc::now());
        self.overall_percentage = 100;
        self.touch();
    }

    /// First fatal error recorded in the progress log, if any.
    pub fn first_step_error(&self) -> Option<&str> {
        self.progress_log
            .iter()
            .find(|r| r.status == StepStatus::Failed)
            .and_then(|r| r.error.as_deref())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ProviderConfig, ProviderId};

    fn sample_job() -> PublishJob {
        PublishJob::new(
            "user-1",
            SourceAsset {
                object_key: "uploads/user-1/video.mp4".into(),
                filename: "video.mp4".into(),
                size_bytes: 1024,
                brief: "new product launch".into(),
            },
            ProviderConfig::uniform(ProviderId::Openai, "gpt-4o-mini"),
        )
    }

    #[test]
    fn test_job_creation() {
        let job = sample_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.overall_percentage, 0);
        assert!(job.progress_log.is_empty());
        assert_eq!(job.instagram.status, PlatformStatus::Pending);
    }

    #[test]
    fn test_percentage_is_monotonic() {
        let mut job = sample_job();
        job.advance_percentage(40);
        job.advance_percentage(20); // retry of an earlier step
        assert_eq!(job.overall_percentage, 40);
        job.advance_percentage(200);
        assert_eq!(job.overall_percentage, 100);
    }

    #[test]
    fn test_terminal_status_combinations() {
        let mut job = sample_job();
        assert_eq!(job.terminal_status(), None);

        job.instagram.complete("ig-1", "https://instagram.com/p/1");
        assert_eq!(job.terminal_status(), None);

        job.youtube.complete("yt-1", "https://youtu.be/1");
        assert_eq!(job.terminal_status(), Some(JobStatus::Completed));

        let mut job = sample_job();
        job.instagram.complete("ig-1", "https://instagram.com/p/1");
        job.youtube.fail("token expired");
        assert_eq!(job.terminal_status(), Some(JobStatus::Partial));

        let mut job = sample_job();
        job.instagram.fail("boom");
        job.youtube.fail("boom");
        assert_eq!(job.terminal_status(), Some(JobStatus::Failed));
    }

    #[test]
    fn test_terminal_status_is_write_once() {
        let mut job = sample_job();
        job.start();
        job.finalize(JobStatus::Partial, Some("one side failed".into()));
        job.finalize(JobStatus::Completed, None);
        assert_eq!(job.status, JobStatus::Partial);
        assert_eq!(job.error.as_deref(), Some("one side failed"));
        assert_eq!(job.overall_percentage, 100);
    }

    #[test]
    fn test_generated_content_write_once() {
        let mut job = sample_job();
        job.set_generated_content(GeneratedContent {
            title: "First".into(),
            ..Default::default()
        });
        job.set_generated_content(GeneratedContent {
            title: "Second".into(),
            ..Default::default()
        });
        assert_eq!(job.generated_content.unwrap().title, "First");
    }

    #[test]
    fn test_step_log_lifecycle() {
        let mut job = sample_job();
        let step = job.begin_step("transcode:instagram");
        job.finish_step(&step, StepStatus::Completed, None);

        let step = job.begin_step("publish:youtube");
        job.finish_step(&step, StepStatus::Failed, Some("quota".into()));

        assert_eq!(job.progress_log.len(), 2);
        assert_eq!(job.progress_log[0].status, StepStatus::Completed);
        assert!(job.progress_log[0].completed_at.is_some());
        assert_eq!(job.first_step_error(), Some("quota"));
    }

    #[test]
    fn test_platform_state_accessors() {
        let mut job = sample_job();
        job.platform_mut(Platform::Youtube).start();
        assert_eq!(
            job.platform(Platform::Youtube).status,
            PlatformStatus::Processing
        );
        assert_eq!(
            job.platform(Platform::Instagram).status,
            PlatformStatus::Pending
        );
    }
}
