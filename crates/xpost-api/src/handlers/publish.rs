//! Publish job handlers.
//!
//! `POST /api/publish` accepts the upload, persists the job document and
//! spawns the pipeline on a detached task; the caller tracks the job through
//! `GET /api/publish/{job_id}` and the WebSocket channel.

use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use xpost_models::{JobId, ProviderConfig, PublishJob, SourceAsset};
use xpost_storage::source_key;
use xpost_store::StoreError;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Hard cap on the uploaded video itself; the body limit above it leaves
/// room for the text parts and multipart framing.
const MAX_VIDEO_BYTES: usize = 100 * 1024 * 1024;

const MAX_BRIEF_CHARS: usize = 4000;

/// 202 body for an accepted upload.
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    #[serde(rename = "jobId")]
    pub job_id: JobId,
}

/// Create a publish job from a multipart upload.
///
/// Fields: `video` (file), `brief` (text), `providers` (JSON per-field
/// provider configuration). Validation failures are rejected synchronously;
/// after the 202 every outcome is reported through the job document only.
pub async fn create_publish_job(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    // The video is spooled to disk while it arrives; buffering a full
    // upload in memory per request does not survive concurrent uploads.
    let spool = tempfile::tempdir()
        .map_err(|e| ApiError::internal(format!("failed to create spool dir: {}", e)))?;
    let video_path = spool.path().join("upload.bin");

    let mut video: Option<(String, String, u64)> = None;
    let mut brief: Option<String> = None;
    let mut providers: Option<ProviderConfig> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "video" => {
                let filename = field.file_name().unwrap_or("upload.mp4").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("video/mp4")
                    .to_string();
                let size_bytes =
                    spool_to_file(field, &video_path, MAX_VIDEO_BYTES as u64).await?;
                video = Some((filename, content_type, size_bytes));
            }
            "brief" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read brief: {}", e)))?;
                brief = Some(text);
            }
            "providers" => {
                let raw = field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("failed to read provider configuration: {}", e))
                })?;
                providers = Some(serde_json::from_str(&raw).map_err(|e| {
                    ApiError::bad_request(format!("invalid provider configuration: {}", e))
                })?);
            }
            _ => {}
        }
    }

    let (filename, content_type, size_bytes) =
        video.ok_or_else(|| ApiError::bad_request("missing video file"))?;
    if size_bytes == 0 {
        return Err(ApiError::bad_request("video file is empty"));
    }

    let brief = clean_brief(brief.as_deref().unwrap_or(""))?;
    let providers =
        providers.ok_or_else(|| ApiError::bad_request("missing provider configuration"))?;

    // One running job per owner; the job document is the source of truth
    // so this survives restarts.
    if state.store.has_active_job(&user.owner_id).await? {
        return Err(ApiError::conflict(
            "another publish job is still running for this account",
        ));
    }

    let mut job = PublishJob::new(
        &user.owner_id,
        SourceAsset {
            object_key: String::new(),
            filename,
            size_bytes,
            brief,
        },
        providers,
    );
    job.source.object_key = source_key(&user.owner_id, &job.id);

    state
        .storage
        .upload_file(&video_path, &job.source.object_key, &content_type)
        .await?;
    state.store.put(&job).await?;
    metrics::record_job_accepted();

    let ctx = state.pipeline.clone();
    let job_id = job.id.clone();
    tokio::spawn(async move {
        if let Err(e) = xpost_pipeline::run(ctx, job_id.clone()).await {
            error!(job_id = %job_id, "pipeline task failed: {}", e);
        }
    });

    info!(job_id = %job.id, owner = %user.owner_id, size = job.source.size_bytes, "publish job accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse { job_id: job.id }),
    ))
}

/// Fetch one job document, owner-scoped.
pub async fn get_publish_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<PublishJob>> {
    let job = match state.store.get(&JobId::from_string(&job_id)).await {
        Ok(job) => job,
        Err(StoreError::JobNotFound(_)) => return Err(ApiError::not_found("job not found")),
        Err(e) => return Err(e.into()),
    };

    // Same response for a foreign job as for a missing one
    if job.owner_id != user.owner_id {
        return Err(ApiError::not_found("job not found"));
    }

    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<PublishJob>,
}

/// List the caller's jobs, most recent first.
pub async fn list_publish_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListJobsParams>,
    user: AuthUser,
) -> ApiResult<Json<JobListResponse>> {
    let limit = params.limit.unwrap_or(20).min(100);
    let jobs = state.store.list_for_owner(&user.owner_id, limit).await?;
    Ok(Json(JobListResponse { jobs }))
}

/// Stream a field's chunks to `dest`, enforcing the size cap as the bytes
/// arrive so an oversize upload is rejected before it is fully received.
/// Returns the number of bytes written.
async fn spool_to_file<S, E>(mut chunks: S, dest: &std::path::Path, cap: u64) -> ApiResult<u64>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| ApiError::internal(format!("failed to spool upload: {}", e)))?;

    let mut written: u64 = 0;
    while let Some(chunk) = chunks.next().await {
        let chunk =
            chunk.map_err(|e| ApiError::bad_request(format!("failed to read video: {}", e)))?;
        written += chunk.len() as u64;
        if written > cap {
            return Err(ApiError::payload_too_large(format!(
                "video exceeds the {} MB limit",
                cap / (1024 * 1024)
            )));
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| ApiError::internal(format!("failed to spool upload: {}", e)))?;
    }
    file.flush()
        .await
        .map_err(|e| ApiError::internal(format!("failed to spool upload: {}", e)))?;
    Ok(written)
}

fn clean_brief(raw: &str) -> ApiResult<String> {
    let brief = raw.trim();
    if brief.is_empty() {
        return Err(ApiError::bad_request("missing brief"));
    }
    if brief.chars().count() > MAX_BRIEF_CHARS {
        return Err(ApiError::bad_request(format!(
            "brief exceeds {} characters",
            MAX_BRIEF_CHARS
        )));
    }
    Ok(brief.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_brief() {
        assert_eq!(clean_brief("  launch video  ").unwrap(), "launch video");
        assert!(clean_brief("").is_err());
        assert!(clean_brief("   \n ").is_err());
        assert!(clean_brief(&"x".repeat(MAX_BRIEF_CHARS + 1)).is_err());
    }

    #[tokio::test]
    async fn test_spool_writes_chunks_and_counts_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("upload.bin");

        let chunks = futures_util::stream::iter(vec![
            Ok::<Bytes, std::convert::Infallible>(Bytes::from(vec![0u8; 1024])),
            Ok(Bytes::from(vec![1u8; 512])),
        ]);
        let written = spool_to_file(chunks, &dest, 4096).await.unwrap();
        assert_eq!(written, 1536);
        assert_eq!(std::fs::read(&dest).unwrap().len(), 1536);
    }

    #[tokio::test]
    async fn test_spool_rejects_oversize_mid_stream() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("upload.bin");

        let chunks = futures_util::stream::iter(vec![
            Ok::<Bytes, std::convert::Infallible>(Bytes::from(vec![0u8; 32])),
            Ok(Bytes::from(vec![0u8; 32])),
        ]);
        let err = spool_to_file(chunks, &dest, 48).await.unwrap_err();
        assert!(matches!(err, ApiError::PayloadTooLarge(_)));
    }

    #[test]
    fn test_accepted_response_field_name() {
        let body = AcceptedResponse {
            job_id: JobId::from_string("abc-123"),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"jobId":"abc-123"}"#);
    }
}
