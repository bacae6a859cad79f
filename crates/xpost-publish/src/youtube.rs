//! YouTube publishing via the Data API resumable upload protocol.
//!
//! The video is uploaded in fixed-size chunks against a session URI. A 308
//! response acknowledges partial progress and carries the last committed
//! byte in its Range header, so an interrupted upload resumes instead of
//! restarting.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

use xpost_models::{sanitize_tags, GeneratedContent, Platform};

use crate::credentials::{CredentialSource, YoutubeCredentials};
use crate::error::{PublishError, PublishResult};
use crate::publisher::{PlatformPublisher, PublishRequest, PublishedMedia};
use crate::retry::{with_retry, RetryConfig};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
const CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// YouTube adapter settings.
#[derive(Debug, Clone)]
pub struct YoutubeConfig {
    pub base_url: String,
    pub chunk_size: u64,
    pub retry: RetryConfig,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            chunk_size: CHUNK_SIZE,
            retry: RetryConfig::default(),
        }
    }
}

pub struct YoutubePublisher {
    client: Client,
    credentials: Arc<dyn CredentialSource>,
    config: YoutubeConfig,
}

#[derive(Debug, Serialize)]
struct VideoResource {
    snippet: Snippet,
    status: UploadStatus,
}

#[derive(Debug, Serialize)]
struct Snippet {
    title: String,
    description: String,
    tags: Vec<String>,
}

#[derive(Debug, Serialize)]
struct UploadStatus {
    #[serde(rename = "privacyStatus")]
    privacy_status: &'static str,
}

#[derive(Debug, Deserialize)]
struct VideoResponse {
    id: String,
}

enum ChunkOutcome {
    /// Server committed bytes up to (excluding) this offset
    Incomplete(u64),
    Done(String),
}

/// Tags sent with the upload: keywords first, hashtags after, sanitized to
/// YouTube's constraints.
pub fn build_tags(content: &GeneratedContent) -> Vec<String> {
    let mut merged: Vec<&str> = content.keywords.iter().map(String::as_str).collect();
    merged.extend(content.hashtags.iter().map(String::as_str));
    sanitize_tags(&merged, &Platform::Youtube.tag_limits())
}

impl YoutubePublisher {
    pub fn new(
        client: Client,
        credentials: Arc<dyn CredentialSource>,
        config: YoutubeConfig,
    ) -> Self {
        Self {
            client,
            credentials,
            config,
        }
    }

    /// Open the resumable session and return its upload URI.
    async fn init_session(
        &self,
        creds: &YoutubeCredentials,
        content: &GeneratedContent,
        total_bytes: u64,
    ) -> PublishResult<String> {
        let url = format!(
            "{}/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status",
            self.config.base_url
        );

        let body = VideoResource {
            snippet: Snippet {
                title: content.title.clone(),
                description: content.description.clone(),
                tags: build_tags(content),
            },
            status: UploadStatus {
                privacy_status: "public",
            },
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&creds.access_token)
            .header("X-Upload-Content-Type", "video/mp4")
            .header("X-Upload-Content-Length", total_bytes)
            .json(&body)
            .send()
            .await
            .map_err(|e| PublishError::transient("youtube", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::from_status("youtube", status.as_u16(), body));
        }

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_else(|| {
                PublishError::bad_response("youtube", "resumable session without Location header")
            })
    }

    async fn upload_chunk(
        &self,
        session_uri: &str,
        file_path: &std::path::Path,
        offset: u64,
        total_bytes: u64,
    ) -> PublishResult<ChunkOutcome> {
        let len = (total_bytes - offset).min(self.config.chunk_size);
        let mut buf = vec![0u8; len as usize];

        let mut file = tokio::fs::File::open(file_path).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.read_exact(&mut buf).await?;

        let last = offset + len - 1;
        let response = self
            .client
            .put(session_uri)
            .header(CONTENT_TYPE, "video/mp4")
            .header(CONTENT_LENGTH, len)
            .header(
                CONTENT_RANGE,
                format!("bytes {}-{}/{}", offset, last, total_bytes),
            )
            .body(buf)
            .send()
            .await
            .map_err(|e| PublishError::transient("youtube", e.to_string()))?;

        let status = response.status().as_u16();
        match status {
            // 308: partial progress, Range header holds the committed span
            308 => {
                let next = response
                    .headers()
                    .get(RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_committed_end)
                    .map(|end| end + 1)
                    // No Range header means nothing was committed
                    .unwrap_or(offset);
                debug!(next, total_bytes, "chunk acknowledged");
                Ok(ChunkOutcome::Incomplete(next))
            }
            200 | 201 => {
                let parsed: VideoResponse = response
                    .json()
                    .await
                    .map_err(|e| PublishError::bad_response("youtube", e.to_string()))?;
                Ok(ChunkOutcome::Done(parsed.id))
            }
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(PublishError::from_status("youtube", s, body))
            }
        }
    }
}

/// Parse the last committed byte out of a 308 Range header ("bytes=0-12345").
fn parse_committed_end(range: &str) -> Option<u64> {
    range
        .trim_start_matches("bytes=")
        .split('-')
        .nth(1)?
        .parse()
        .ok()
}

#[async_trait]
impl PlatformPublisher for YoutubePublisher {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    async fn publish(&self, request: &PublishRequest) -> PublishResult<PublishedMedia> {
        let creds = self.credentials.youtube(&request.owner_id).await?;

        let total_bytes = tokio::fs::metadata(&request.video_path).await?.len();
        if total_bytes == 0 {
            return Err(PublishError::bad_response("youtube", "render file is empty"));
        }

        let session_uri = with_retry(&self.config.retry, "youtube:init", || {
            self.init_session(&creds, &request.content, total_bytes)
        })
        .await?;

        let mut offset = 0u64;
        let video_id = loop {
            let outcome = with_retry(&self.config.retry, "youtube:chunk", || {
                self.upload_chunk(&session_uri, &request.video_path, offset, total_bytes)
            })
            .await?;

            match outcome {
                ChunkOutcome::Incomplete(next) => {
                    if next >= total_bytes {
                        return Err(PublishError::bad_response(
                            "youtube",
                            "server acknowledged full upload without finalizing",
                        ));
                    }
                    offset = next;
                }
                ChunkOutcome::Done(id) => break id,
            }
        };

        info!(video_id = %video_id, "published to YouTube");

        Ok(PublishedMedia {
            external_url: format!("https://youtu.be/{}", video_id),
            external_id: video_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::InstagramCredentials;
    use std::io::Write;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedCreds;

    #[async_trait]
    impl CredentialSource for FixedCreds {
        async fn instagram(&self, _owner_id: &str) -> PublishResult<InstagramCredentials> {
            InstagramCredentials::new("ig", "ig-token")
        }

        async fn youtube(&self, _owner_id: &str) -> PublishResult<YoutubeCredentials> {
            YoutubeCredentials::new("yt-token")
        }
    }

    fn publisher(server: &MockServer, chunk_size: u64) -> YoutubePublisher {
        YoutubePublisher::new(
            Client::new(),
            Arc::new(FixedCreds),
            YoutubeConfig {
                base_url: server.uri(),
                chunk_size,
                retry: RetryConfig {
                    max_retries: 0,
                    base_delay_ms: 1,
                    max_delay_ms: 1,
                },
            },
        )
    }

    fn request(video_path: std::path::PathBuf) -> PublishRequest {
        PublishRequest {
            owner_id: "user-1".into(),
            video_path,
            video_url: "unused".into(),
            content: GeneratedContent {
                title: "Launch".into(),
                description: "Demo".into(),
                keywords: vec!["product launch".into()],
                hashtags: vec!["#launch".into(), "product launch".into()],
            },
        }
    }

    fn temp_video(bytes: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0xabu8; bytes]).unwrap();
        file
    }

    #[test]
    fn test_tags_merge_and_dedup() {
        let tags = build_tags(&request("x".into()).content);
        // "#launch" cleans to "launch"; duplicate keyword collapses
        assert_eq!(tags, vec!["product launch", "launch"]);
    }

    #[test]
    fn test_parse_committed_end() {
        assert_eq!(parse_committed_end("bytes=0-8388607"), Some(8388607));
        assert_eq!(parse_committed_end("garbage"), None);
    }

    #[tokio::test]
    async fn test_single_chunk_upload() {
        let server = MockServer::start().await;
        let session = format!("{}/session-1", server.uri());

        Mock::given(method("POST"))
            .and(path("/upload/youtube/v3/videos"))
            .and(header("authorization", "Bearer yt-token"))
            .respond_with(ResponseTemplate::new(200).insert_header("location", session.as_str()))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/session-1"))
            .and(header("content-range", "bytes 0-9/10"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "vid-1"})),
            )
            .mount(&server)
            .await;

        let file = temp_video(10);
        let media = publisher(&server, 64)
            .publish(&request(file.path().to_path_buf()))
            .await
            .unwrap();
        assert_eq!(media.external_id, "vid-1");
        assert_eq!(media.external_url, "https://youtu.be/vid-1");
    }

    #[tokio::test]
    async fn test_chunked_upload_resumes_from_range() {
        let server = MockServer::start().await;
        let session = format!("{}/session-2", server.uri());

        Mock::given(method("POST"))
            .and(path("/upload/youtube/v3/videos"))
            .respond_with(ResponseTemplate::new(200).insert_header("location", session.as_str()))
            .mount(&server)
            .await;

        // First 4-byte chunk: committed
        Mock::given(method("PUT"))
            .and(path("/session-2"))
            .and(header("content-range", "bytes 0-3/10"))
            .respond_with(ResponseTemplate::new(308).insert_header("range", "bytes=0-3"))
            .mount(&server)
            .await;

        // Second chunk: only 2 more bytes committed
        Mock::given(method("PUT"))
            .and(path("/session-2"))
            .and(header("content-range", "bytes 4-7/10"))
            .respond_with(ResponseTemplate::new(308).insert_header("range", "bytes=0-5"))
            .mount(&server)
            .await;

        // Resumed chunk from the committed offset finishes the upload
        Mock::given(method("PUT"))
            .and(path("/session-2"))
            .and(header("content-range", "bytes 6-9/10"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "vid-2"})),
            )
            .mount(&server)
            .await;

        let file = temp_video(10);
        let media = publisher(&server, 4)
            .publish(&request(file.path().to_path_buf()))
            .await
            .unwrap();
        assert_eq!(media.external_id, "vid-2");
    }

    #[tokio::test]
    async fn test_quota_rejection_is_permanent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/upload/youtube/v3/videos"))
            .respond_with(ResponseTemplate::new(403).set_body_string("quotaExceeded"))
            .mount(&server)
            .await;

        let file = temp_video(10);
        let err = publisher(&server, 4)
            .publish(&request(file.path().to_path_buf()))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Credential { .. }));
    }
}
