//! Publish job orchestration.
//!
//! Drives a job from accepted upload to terminal status: source fetch,
//! concurrent per-platform transcodes and AI metadata generation, then
//! independent Instagram and YouTube publishes joined at a barrier that
//! settles completed/partial/failed.

pub mod config;
pub mod error;
pub mod run;
pub mod seams;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use run::{run, PipelineContext};
pub use seams::{
    AiMetadataSource, FfmpegTranscoder, MediaRepository, MetadataSource, ProgressSink,
    RedisProgressSink, StorageRepository, TranscodeOutput, Transcoder,
};
