//! S3-compatible object storage.
//!
//! Source uploads land under `sources/{owner}/{job}/`, rendered files under
//! `renders/{job}/`. Platform publishers consume presigned GET URLs.

pub mod client;
pub mod error;

pub use client::{render_key, source_key, MediaStore, StorageConfig};
pub use error::{StorageError, StorageResult};
