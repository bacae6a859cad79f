//! Platform credential lookup.
//!
//! Tokens arrive from whatever account-linking flow the deployment uses;
//! publishers only see the resolved values. Values are trimmed on
//! construction since copy-pasted tokens routinely carry stray whitespace.

use async_trait::async_trait;

use crate::error::{PublishError, PublishResult};

/// Instagram Graph API credentials for one user.
#[derive(Debug, Clone)]
pub struct InstagramCredentials {
    /// IG professional account ID
    pub user_id: String,
    /// Long-lived access token
    pub access_token: String,
}

impl InstagramCredentials {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> PublishResult<Self> {
        let user_id = user_id.into().trim().to_string();
        let access_token = access_token.into().trim().to_string();
        if user_id.is_empty() || access_token.is_empty() {
            return Err(PublishError::credential(
                "instagram",
                "account is not connected",
            ));
        }
        Ok(Self {
            user_id,
            access_token,
        })
    }
}

/// YouTube Data API credentials for one user.
#[derive(Debug, Clone)]
pub struct YoutubeCredentials {
    /// OAuth access token with youtube.upload scope
    pub access_token: String,
}

impl YoutubeCredentials {
    pub fn new(access_token: impl Into<String>) -> PublishResult<Self> {
        let access_token = access_token.into().trim().to_string();
        if access_token.is_empty() {
            return Err(PublishError::credential(
                "youtube",
                "account is not connected",
            ));
        }
        Ok(Self { access_token })
    }
}

/// Where publishers get per-owner credentials from.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn instagram(&self, owner_id: &str) -> PublishResult<InstagramCredentials>;
    async fn youtube(&self, owner_id: &str) -> PublishResult<YoutubeCredentials>;
}

/// Single-tenant source reading fixed credentials from the environment.
pub struct EnvCredentialSource;

#[async_trait]
impl CredentialSource for EnvCredentialSource {
    async fn instagram(&self, _owner_id: &str) -> PublishResult<InstagramCredentials> {
        let user_id = std::env::var("INSTAGRAM_USER_ID")
            .map_err(|_| PublishError::credential("instagram", "INSTAGRAM_USER_ID not set"))?;
        let token = std::env::var("INSTAGRAM_ACCESS_TOKEN").map_err(|_| {
            PublishError::credential("instagram", "INSTAGRAM_ACCESS_TOKEN not set")
        })?;
        InstagramCredentials::new(user_id, token)
    }

    async fn youtube(&self, _owner_id: &str) -> PublishResult<YoutubeCredentials> {
        let token = std::env::var("YOUTUBE_ACCESS_TOKEN")
            .map_err(|_| PublishError::credential("youtube", "YOUTUBE_ACCESS_TOKEN not set"))?;
        YoutubeCredentials::new(token)
    }
}
