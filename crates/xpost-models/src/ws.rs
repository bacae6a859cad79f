//! Progress event schema.
//!
//! Typed events pushed over the per-job broadcast channel and the WebSocket.
//! Events carry the step name, its status and the overall percentage so a
//! client can render progress without extra lookups; there is no replay, so
//! a late subscriber must also poll the job document.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{JobId, JobStatus, StepStatus};
use crate::platform::Platform;

/// Progress event envelope.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A pipeline step changed state.
    Step {
        step: String,
        status: StepStatus,
        /// Overall job percentage (0-100), non-decreasing
        percentage: u8,
        message: String,
        /// Step-specific payload (e.g. transcode sub-progress)
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
        timestamp: DateTime<Utc>,
    },

    /// One platform publish succeeded.
    PlatformPublished {
        platform: Platform,
        #[serde(rename = "externalId")]
        external_id: String,
        #[serde(rename = "externalUrl")]
        external_url: String,
    },

    /// One platform publish failed permanently.
    PlatformFailed { platform: Platform, error: String },

    /// The job reached a terminal status.
    JobFinished {
        #[serde(rename = "jobId")]
        job_id: JobId,
        status: JobStatus,
        percentage: u8,
    },
}

impl ProgressEvent {
    /// Create a step event.
    pub fn step(
        step: impl Into<String>,
        status: StepStatus,
        percentage: u8,
        message: impl Into<String>,
    ) -> Self {
        ProgressEvent::Step {
            step: step.into(),
            status,
            percentage: percentage.min(100),
            message: message.into(),
            data: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a step event carrying extra data.
    pub fn step_with_data(
        step: impl Into<String>,
        status: StepStatus,
        percentage: u8,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        ProgressEvent::Step {
            step: step.into(),
            status,
            percentage: percentage.min(100),
            message: message.into(),
            data: Some(data),
            timestamp: Utc::now(),
        }
    }

    /// Create a platform success event.
    pub fn platform_published(
        platform: Platform,
        external_id: impl Into<String>,
        external_url: impl Into<String>,
    ) -> Self {
        ProgressEvent::PlatformPublished {
            platform,
            external_id: external_id.into(),
            external_url: external_url.into(),
        }
    }

    /// Create a platform failure event.
    pub fn platform_failed(platform: Platform, error: impl Into<String>) -> Self {
        ProgressEvent::PlatformFailed {
            platform,
            error: error.into(),
        }
    }

    /// Create a terminal event.
    pub fn job_finished(job_id: JobId, status: JobStatus) -> Self {
        ProgressEvent::JobFinished {
            job_id,
            status,
            percentage: 100,
        }
    }

    /// Whether this event ends the stream for a subscriber.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::JobFinished { .. })
    }
}

/// First message a WebSocket client sends to attach to a job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WsSubscribeRequest {
    /// Bearer session token
    pub token: String,
    /// Job to follow
    pub job_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_event_serialization() {
        let event = ProgressEvent::step("transcode:youtube", StepStatus::Running, 12, "Transcoding");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"step\""));
        assert!(json.contains("\"step\":\"transcode:youtube\""));
        assert!(json.contains("\"percentage\":12"));
    }

    #[test]
    fn test_percentage_clamped() {
        let event = ProgressEvent::step("x", StepStatus::Completed, 150, "");
        if let ProgressEvent::Step { percentage, .. } = event {
            assert_eq!(percentage, 100);
        } else {
            panic!("expected Step event");
        }
    }

    #[test]
    fn test_terminal_detection() {
        let done = ProgressEvent::job_finished(JobId::new(), JobStatus::Completed);
        assert!(done.is_terminal());
        let step = ProgressEvent::step("x", StepStatus::Running, 1, "");
        assert!(!step.is_terminal());

        let json = serde_json::to_string(&done).unwrap();
        assert!(json.contains("\"status\":\"completed\""));
    }

    #[test]
    fn test_platform_published_field_names() {
        let event =
            ProgressEvent::platform_published(Platform::Youtube, "vid123", "https://youtu.be/vid123");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"externalId\":\"vid123\""));
        assert!(json.contains("\"externalUrl\""));
    }
}
