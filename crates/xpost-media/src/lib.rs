//! FFmpeg and FFprobe CLI wrappers.
//!
//! Probes source uploads and transcodes them into each platform's exact
//! frame and codec requirements, reporting encode progress as integer
//! percentages.

pub mod command;
pub mod convert;
pub mod error;
pub mod probe;

pub use command::{run_transcode, TranscodeCommand};
pub use convert::{build_filter, convert_for_platform, cover_dimensions, ConvertOutcome};
pub use error::{MediaError, MediaResult};
pub use probe::{probe, MediaProbe};
