//! Pipeline error types.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Media error: {0}")]
    Media(#[from] xpost_media::MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] xpost_storage::StorageError),

    #[error("Store error: {0}")]
    Store(#[from] xpost_store::StoreError),

    #[error("AI error: {0}")]
    Ai(#[from] xpost_ai::AiError),

    #[error("Publish error: {0}")]
    Publish(#[from] xpost_publish::PublishError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Stage(String),
}

impl PipelineError {
    pub fn stage(msg: impl Into<String>) -> Self {
        Self::Stage(msg.into())
    }
}
