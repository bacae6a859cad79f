//! HTTP request handlers.

pub mod health;
pub mod publish;

pub use health::{health, ready};
pub use publish::{create_publish_job, get_publish_job, list_publish_jobs};
