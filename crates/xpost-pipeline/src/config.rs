//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Scratch space for downloaded sources and renders; one subdirectory
    /// per job, removed when the job finishes.
    pub work_dir: PathBuf,
    /// Lifetime of presigned render URLs handed to platform APIs.
    pub presign_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("crosspost"),
            presign_ttl: Duration::from_secs(3600),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("PIPELINE_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("crosspost")),
            presign_ttl: Duration::from_secs(
                std::env::var("PIPELINE_PRESIGN_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
        }
    }
}
