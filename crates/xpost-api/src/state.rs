//! Application state.

use std::sync::Arc;
use std::time::Duration;

use xpost_ai::{GeneratorConfig, MetadataGenerator, ProviderRegistry};
use xpost_pipeline::{
    AiMetadataSource, FfmpegTranscoder, PipelineConfig, PipelineContext, RedisProgressSink,
    StorageRepository,
};
use xpost_progress::ProgressChannel;
use xpost_publish::{
    CredentialSource, EnvCredentialSource, InstagramConfig, InstagramPublisher, PlatformPublisher,
    YoutubeConfig, YoutubePublisher,
};
use xpost_storage::{MediaStore, StorageConfig};
use xpost_store::{JobStore, RedisJobStore, StoreResult};

use crate::auth::TokenVerifier;
use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn JobStore>,
    pub storage: Arc<MediaStore>,
    pub progress: Arc<ProgressChannel>,
    pub tokens: Arc<TokenVerifier>,
    pub pipeline: Arc<PipelineContext>,
    /// Concrete store handle, kept for readiness pings
    redis_store: Arc<RedisJobStore>,
}

impl AppState {
    /// Create new application state.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let storage = Arc::new(MediaStore::new(StorageConfig::from_env()?).await?);
        let redis_store = Arc::new(RedisJobStore::from_env()?);
        let store: Arc<dyn JobStore> = redis_store.clone();
        let progress = Arc::new(ProgressChannel::from_env()?);
        let tokens = Arc::new(TokenVerifier::from_env()?);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        let registry = Arc::new(ProviderRegistry::new(http.clone()));
        let generator = MetadataGenerator::new(registry, GeneratorConfig::default());

        let credentials: Arc<dyn CredentialSource> = Arc::new(EnvCredentialSource);
        let publishers: Vec<Arc<dyn PlatformPublisher>> = vec![
            Arc::new(InstagramPublisher::new(
                http.clone(),
                credentials.clone(),
                InstagramConfig::default(),
            )),
            Arc::new(YoutubePublisher::new(
                http,
                credentials,
                YoutubeConfig::default(),
            )),
        ];

        let pipeline_config = PipelineConfig::from_env();
        let presign_ttl = pipeline_config.presign_ttl;
        let pipeline = Arc::new(PipelineContext {
            store: store.clone(),
            repository: Arc::new(StorageRepository::new((*storage).clone(), presign_ttl)),
            transcoder: Arc::new(FfmpegTranscoder),
            metadata: Arc::new(AiMetadataSource::new(generator)),
            progress: Arc::new(RedisProgressSink::new(ProgressChannel::from_env()?)),
            publishers,
            config: pipeline_config,
        });

        Ok(Self {
            config,
            store,
            storage,
            progress,
            tokens,
            pipeline,
            redis_store,
        })
    }

    /// Ping the Redis job store.
    pub async fn ping_store(&self) -> StoreResult<()> {
        self.redis_store.check_connectivity().await
    }
}
