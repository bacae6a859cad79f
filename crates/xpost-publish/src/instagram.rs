//! Instagram Reels publishing via the Graph API.
//!
//! Three-step flow: create a media container pointing at the rendered
//! file's URL, poll the container until Instagram finishes server-side
//! processing, then commit it to the user's feed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use xpost_models::{sanitize_tags, GeneratedContent, Platform};

use crate::credentials::{CredentialSource, InstagramCredentials};
use crate::error::{PublishError, PublishResult};
use crate::publisher::{PlatformPublisher, PublishRequest, PublishedMedia};
use crate::retry::{with_retry, RetryConfig};

const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v21.0";

/// Instagram adapter settings.
#[derive(Debug, Clone)]
pub struct InstagramConfig {
    pub base_url: String,
    /// Wait between container status checks
    pub poll_interval_ms: u64,
    /// Give up after this many status checks
    pub max_poll_attempts: u32,
    pub retry: RetryConfig,
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval_ms: 2000,
            max_poll_attempts: 30,
            retry: RetryConfig::default(),
        }
    }
}

pub struct InstagramPublisher {
    client: Client,
    credentials: Arc<dyn CredentialSource>,
    config: InstagramConfig,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    /// Absent on some API versions once processing is done
    status_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PermalinkResponse {
    permalink: Option<String>,
}

/// Build the Reel caption: description first, hashtags appended with '#'.
pub fn build_caption(content: &GeneratedContent) -> String {
    let tags = sanitize_tags(&content.hashtags, &Platform::Instagram.tag_limits());
    if tags.is_empty() {
        return content.description.clone();
    }
    let tag_line = tags
        .iter()
        .map(|t| format!("#{}", t.replace(' ', "")))
        .collect::<Vec<_>>()
        .join(" ");
    if content.description.is_empty() {
        tag_line
    } else {
        format!("{}\n\n{}", content.description, tag_line)
    }
}

impl InstagramPublisher {
    pub fn new(
        client: Client,
        credentials: Arc<dyn CredentialSource>,
        config: InstagramConfig,
    ) -> Self {
        Self {
            client,
            credentials,
            config,
        }
    }

    async fn create_container(
        &self,
        creds: &InstagramCredentials,
        video_url: &str,
        caption: &str,
    ) -> PublishResult<String> {
        let url = format!("{}/{}/media", self.config.base_url, creds.user_id);

        let response = self
            .client
            .post(&url)
            .form(&[
                ("media_type", "REELS"),
                ("video_url", video_url),
                ("caption", caption),
                ("access_token", &creds.access_token),
            ])
            .send()
            .await
            .map_err(|e| PublishError::transient("instagram", e.to_string()))?;

        let parsed: IdResponse = read_json("instagram", response).await?;
        debug!(container_id = %parsed.id, "created media container");
        Ok(parsed.id)
    }

    /// Poll until the container is ready to commit.
    async fn wait_for_container(
        &self,
        creds: &InstagramCredentials,
        container_id: &str,
    ) -> PublishResult<()> {
        let url = format!("{}/{}", self.config.base_url, container_id);

        for attempt in 1..=self.config.max_poll_attempts {
            tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;

            let response = self
                .client
                .get(&url)
                .query(&[
                    ("fields", "status_code"),
                    ("access_token", creds.access_token.as_str()),
                ])
                .send()
                .await
                .map_err(|e| PublishError::transient("instagram", e.to_string()));

            // A failed status check burns an attempt instead of failing the job
            let status: ContainerStatus = match response {
                Ok(r) => match read_json("instagram", r).await {
                    Ok(s) => s,
                    Err(e) if e.is_retryable() => continue,
                    Err(e) => return Err(e),
                },
                Err(_) => continue,
            };

            match status.status_code.as_deref() {
                // No status field means processing already finished
                None | Some("FINISHED") => {
                    debug!(container_id, attempt, "container ready");
                    return Ok(());
                }
                Some("ERROR") | Some("EXPIRED") => {
                    return Err(PublishError::Rejected {
                        platform: "instagram".to_string(),
                        status: 200,
                        body: "media container processing failed".to_string(),
                    });
                }
                Some(_) => continue,
            }
        }

        Err(PublishError::ProcessingTimeout {
            platform: "instagram".to_string(),
            attempts: self.config.max_poll_attempts,
        })
    }

    async fn commit(
        &self,
        creds: &InstagramCredentials,
        container_id: &str,
    ) -> PublishResult<String> {
        let url = format!("{}/{}/media_publish", self.config.base_url, creds.user_id);

        let response = self
            .client
            .post(&url)
            .form(&[
                ("creation_id", container_id),
                ("access_token", &creds.access_token),
            ])
            .send()
            .await
            .map_err(|e| PublishError::transient("instagram", e.to_string()))?;

        let parsed: IdResponse = read_json("instagram", response).await?;
        Ok(parsed.id)
    }

    /// Best-effort permalink lookup; a miss falls back to the media ID URL.
    async fn permalink(&self, creds: &InstagramCredentials, media_id: &str) -> String {
        let url = format!("{}/{}", self.config.base_url, media_id);

        let fetched = self
            .client
            .get(&url)
            .query(&[
                ("fields", "permalink"),
                ("access_token", creds.access_token.as_str()),
            ])
            .send()
            .await
            .ok();

        if let Some(response) = fetched {
            if let Ok(parsed) = response.json::<PermalinkResponse>().await {
                if let Some(link) = parsed.permalink {
                    return link;
                }
            }
        }
        format!("https://www.instagram.com/reel/{}/", media_id)
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    platform: &str,
    response: reqwest::Response,
) -> PublishResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PublishError::from_status(platform, status.as_u16(), body));
    }
    response
        .json()
        .await
        .map_err(|e| PublishError::bad_response(platform, e.to_string()))
}

#[async_trait]
impl PlatformPublisher for InstagramPublisher {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn publish(&self, request: &PublishRequest) -> PublishResult<PublishedMedia> {
        let creds = self.credentials.instagram(&request.owner_id).await?;
        let caption = build_caption(&request.content);

        let container_id = with_retry(&self.config.retry, "instagram:create", || {
            self.create_container(&creds, &request.video_url, &caption)
        })
        .await?;

        self.wait_for_container(&creds, &container_id).await?;

        let media_id = with_retry(&self.config.retry, "instagram:commit", || {
            self.commit(&creds, &container_id)
        })
        .await?;

        let external_url = self.permalink(&creds, &media_id).await;
        info!(media_id = %media_id, "published to Instagram");

        Ok(PublishedMedia {
            external_id: media_id,
            external_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::YoutubeCredentials;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedCreds;

    #[async_trait]
    impl CredentialSource for FixedCreds {
        async fn instagram(&self, _owner_id: &str) -> PublishResult<InstagramCredentials> {
            InstagramCredentials::new("17840000", "ig-token")
        }

        async fn youtube(&self, _owner_id: &str) -> PublishResult<YoutubeCredentials> {
            YoutubeCredentials::new("yt-token")
        }
    }

    fn publisher(server: &MockServer) -> InstagramPublisher {
        InstagramPublisher::new(
            Client::new(),
            Arc::new(FixedCreds),
            InstagramConfig {
                base_url: server.uri(),
                poll_interval_ms: 1,
                max_poll_attempts: 3,
                retry: RetryConfig {
                    max_retries: 0,
                    base_delay_ms: 1,
                    max_delay_ms: 1,
                },
            },
        )
    }

    fn request() -> PublishRequest {
        PublishRequest {
            owner_id: "user-1".into(),
            video_path: "/tmp/instagram.mp4".into(),
            video_url: "https://store.example/renders/1/instagram.mp4?sig=x".into(),
            content: GeneratedContent {
                title: "Launch".into(),
                description: "Our new product.".into(),
                keywords: vec!["product".into()],
                hashtags: vec!["launch".into(), "demo".into()],
            },
        }
    }

    #[test]
    fn test_caption_appends_hashtags() {
        let caption = build_caption(&request().content);
        assert_eq!(caption, "Our new product.\n\n#launch #demo");
    }

    #[test]
    fn test_caption_without_description() {
        let mut content = request().content;
        content.description.clear();
        assert_eq!(build_caption(&content), "#launch #demo");
    }

    #[tokio::test]
    async fn test_publish_happy_path() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/17840000/media"))
            .and(body_string_contains("media_type=REELS"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "cont-1"})),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/cont-1"))
            .and(query_param("fields", "status_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"status_code": "FINISHED"}),
            ))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/17840000/media_publish"))
            .and(body_string_contains("creation_id=cont-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "media-9"})),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/media-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"permalink": "https://www.instagram.com/reel/XYZ/"}),
            ))
            .mount(&server)
            .await;

        let media = publisher(&server).publish(&request()).await.unwrap();
        assert_eq!(media.external_id, "media-9");
        assert_eq!(media.external_url, "https://www.instagram.com/reel/XYZ/");
    }

    #[tokio::test]
    async fn test_missing_status_code_counts_as_ready() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/17840000/media"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "cont-2"})),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/cont-2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "cont-2"})),
            )
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/17840000/media_publish"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "media-2"})),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/media-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let media = publisher(&server).publish(&request()).await.unwrap();
        assert_eq!(media.external_id, "media-2");
        assert_eq!(media.external_url, "https://www.instagram.com/reel/media-2/");
    }

    #[tokio::test]
    async fn test_container_error_rejects() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/17840000/media"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "cont-3"})),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/cont-3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"status_code": "ERROR"}),
            ))
            .mount(&server)
            .await;

        let err = publisher(&server).publish(&request()).await.unwrap_err();
        assert!(matches!(err, PublishError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_stuck_container_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/17840000/media"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "cont-4"})),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/cont-4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"status_code": "IN_PROGRESS"}),
            ))
            .mount(&server)
            .await;

        let err = publisher(&server).publish(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::ProcessingTimeout { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_expired_token_is_credential_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/17840000/media"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .mount(&server)
            .await;

        let err = publisher(&server).publish(&request()).await.unwrap_err();
        assert!(matches!(err, PublishError::Credential { .. }));
    }
}
