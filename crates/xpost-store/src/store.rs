//! Job document persistence.
//!
//! Jobs are stored as JSON documents keyed by job ID, with a per-owner
//! sorted set indexing them by creation time for recency-ordered listing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use xpost_models::{JobId, PublishJob};

use crate::error::{StoreError, StoreResult};

/// Persistence seam for publish jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a job document, inserting or replacing.
    async fn put(&self, job: &PublishJob) -> StoreResult<()>;

    /// Fetch a job by ID.
    async fn get(&self, id: &JobId) -> StoreResult<PublishJob>;

    /// List an owner's jobs, most recently created first.
    async fn list_for_owner(&self, owner_id: &str, limit: usize) -> StoreResult<Vec<PublishJob>>;

    /// Whether the owner currently has a job in a non-terminal state.
    async fn has_active_job(&self, owner_id: &str) -> StoreResult<bool>;

    /// Lock guarding read-modify-write cycles on one job document.
    fn write_lock(&self, id: &JobId) -> Arc<tokio::sync::Mutex<()>>;
}

impl dyn JobStore {
    /// Read-modify-write helper: fetch, apply `f`, persist, return the
    /// updated document. Holds the document's write lock across the fetch
    /// and the persist, so concurrent stages mutating different parts of
    /// one job cannot overwrite each other's writes. Every stage of a job
    /// runs in the process that accepted it, so an in-process lock covers
    /// all writers of a document.
    pub async fn update<F>(&self, id: &JobId, f: F) -> StoreResult<PublishJob>
    where
        F: FnOnce(&mut PublishJob) + Send,
    {
        let lock = self.write_lock(id);
        let _guard = lock.lock().await;
        let mut job = self.get(id).await?;
        f(&mut job);
        self.put(&job).await?;
        Ok(job)
    }
}

/// Per-document write locks, handed out by [`JobStore::write_lock`].
/// Entries are weak so the map only holds locks for documents with an
/// update in flight.
#[derive(Default)]
pub struct JobLocks {
    inner: Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>,
}

impl JobLocks {
    fn acquire(&self, id: &JobId) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = match self.inner.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.retain(|_, weak| weak.strong_count() > 0);
        if let Some(existing) = map.get(id.as_str()).and_then(Weak::upgrade) {
            return existing;
        }
        let fresh = Arc::new(tokio::sync::Mutex::new(()));
        map.insert(id.as_str().to_string(), Arc::downgrade(&fresh));
        fresh
    }
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub redis_url: String,
    /// Key prefix, lets several deployments share one Redis
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "xpost".to_string(),
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: std::env::var("STORE_KEY_PREFIX").unwrap_or_else(|_| "xpost".to_string()),
        }
    }
}

/// Redis-backed job store.
pub struct RedisJobStore {
    client: redis::Client,
    prefix: String,
    locks: JobLocks,
}

impl RedisJobStore {
    /// Create a new store.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            prefix: config.key_prefix,
            locks: JobLocks::default(),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        Self::new(StoreConfig::from_env())
    }

    fn job_key(&self, id: &JobId) -> String {
        format!("{}:job:{}", self.prefix, id)
    }

    fn owner_key(&self, owner_id: &str) -> String {
        format!("{}:jobs:owner:{}", self.prefix, owner_id)
    }

    /// Check connectivity with a PING.
    pub async fn check_connectivity(&self) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(StoreError::Redis)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn put(&self, job: &PublishJob) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(job)?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(self.job_key(&job.id), payload)
            .zadd(
                self.owner_key(&job.owner_id),
                job.id.as_str(),
                job.created_at.timestamp_millis(),
            );
        pipe.query_async::<()>(&mut conn).await?;

        debug!(job_id = %job.id, status = %job.status, "persisted job");
        Ok(())
    }

    async fn get(&self, id: &JobId) -> StoreResult<PublishJob> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.get(self.job_key(id)).await?;
        let payload = payload.ok_or_else(|| StoreError::job_not_found(id.as_str()))?;
        Ok(serde_json::from_str(&payload)?)
    }

    async fn list_for_owner(&self, owner_id: &str, limit: usize) -> StoreResult<Vec<PublishJob>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // Newest first
        let ids: Vec<String> = conn
            .zrevrange(self.owner_key(owner_id), 0, limit as isize - 1)
            .await?;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            let payload: Option<String> = conn.get(self.job_key(&JobId::from_string(&id))).await?;
            // Index entries can outlive evicted documents; skip those.
            if let Some(payload) = payload {
                jobs.push(serde_json::from_str(&payload)?);
            }
        }
        Ok(jobs)
    }

    async fn has_active_job(&self, owner_id: &str) -> StoreResult<bool> {
        // Active jobs are always among the most recent few.
        let recent = self.list_for_owner(owner_id, 20).await?;
        Ok(recent.iter().any(|j| !j.status.is_terminal()))
    }

    fn write_lock(&self, id: &JobId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.acquire(id)
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<String, PublishJob>>,
    locks: JobLocks,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn put(&self, job: &PublishJob) -> StoreResult<()> {
        let mut jobs = self.jobs.lock().map_err(|_| {
            StoreError::ConnectionFailed("in-memory store lock poisoned".to_string())
        })?;
        jobs.insert(job.id.as_str().to_string(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &JobId) -> StoreResult<PublishJob> {
        let jobs = self.jobs.lock().map_err(|_| {
            StoreError::ConnectionFailed("in-memory store lock poisoned".to_string())
        })?;
        jobs.get(id.as_str())
            .cloned()
            .ok_or_else(|| StoreError::job_not_found(id.as_str()))
    }

    async fn list_for_owner(&self, owner_id: &str, limit: usize) -> StoreResult<Vec<PublishJob>> {
        let jobs = self.jobs.lock().map_err(|_| {
            StoreError::ConnectionFailed("in-memory store lock poisoned".to_string())
        })?;
        let mut owned: Vec<PublishJob> = jobs
            .values()
            .filter(|j| j.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned.truncate(limit);
        Ok(owned)
    }

    async fn has_active_job(&self, owner_id: &str) -> StoreResult<bool> {
        let jobs = self.jobs.lock().map_err(|_| {
            StoreError::ConnectionFailed("in-memory store lock poisoned".to_string())
        })?;
        Ok(jobs
            .values()
            .any(|j| j.owner_id == owner_id && !j.status.is_terminal()))
    }

    fn write_lock(&self, id: &JobId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.acquire(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xpost_models::{JobStatus, Platform, ProviderConfig, ProviderId, SourceAsset};

    /// In-memory store with a delayed read, so interleaved
    /// read-modify-write cycles actually overlap.
    #[derive(Default)]
    struct SlowReadStore {
        inner: InMemoryJobStore,
    }

    #[async_trait]
    impl JobStore for SlowReadStore {
        async fn put(&self, job: &PublishJob) -> StoreResult<()> {
            self.inner.put(job).await
        }

        async fn get(&self, id: &JobId) -> StoreResult<PublishJob> {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            self.inner.get(id).await
        }

        async fn list_for_owner(
            &self,
            owner_id: &str,
            limit: usize,
        ) -> StoreResult<Vec<PublishJob>> {
            self.inner.list_for_owner(owner_id, limit).await
        }

        async fn has_active_job(&self, owner_id: &str) -> StoreResult<bool> {
            self.inner.has_active_job(owner_id).await
        }

        fn write_lock(&self, id: &JobId) -> Arc<tokio::sync::Mutex<()>> {
            self.inner.write_lock(id)
        }
    }

    fn sample_job(owner: &str) -> PublishJob {
        PublishJob::new(
            owner,
            SourceAsset {
                object_key: "sources/u/1/source.mp4".into(),
                filename: "clip.mp4".into(),
                size_bytes: 1,
                brief: "brief".into(),
            },
            ProviderConfig::uniform(ProviderId::Openai, "gpt-4o-mini"),
        )
    }

    #[tokio::test]
    async fn test_in_memory_put_get() {
        let store = InMemoryJobStore::new();
        let job = sample_job("user-1");
        store.put(&job).await.unwrap();

        let loaded = store.get(&job.id).await.unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.owner_id, "user-1");

        let missing = store.get(&JobId::from_string("nope")).await;
        assert!(matches!(missing, Err(StoreError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn test_in_memory_listing_is_newest_first() {
        let store = InMemoryJobStore::new();
        let mut older = sample_job("user-1");
        older.created_at = older.created_at - chrono::Duration::seconds(60);
        let newer = sample_job("user-1");
        let other = sample_job("user-2");

        store.put(&older).await.unwrap();
        store.put(&newer).await.unwrap();
        store.put(&other).await.unwrap();

        let listed = store.list_for_owner("user-1", 10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newer.id);
        assert_eq!(listed[1].id, older.id);
    }

    #[tokio::test]
    async fn test_active_job_detection() {
        let store = InMemoryJobStore::new();
        let mut job = sample_job("user-1");
        store.put(&job).await.unwrap();
        assert!(store.has_active_job("user-1").await.unwrap());
        assert!(!store.has_active_job("user-2").await.unwrap());

        job.start();
        job.finalize(xpost_models::JobStatus::Failed, Some("boom".into()));
        store.put(&job).await.unwrap();
        assert!(!store.has_active_job("user-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_helper() {
        let store: std::sync::Arc<dyn JobStore> = std::sync::Arc::new(InMemoryJobStore::new());
        let job = sample_job("user-1");
        store.put(&job).await.unwrap();

        let updated = store
            .update(&job.id, |j| j.advance_percentage(42))
            .await
            .unwrap();
        assert_eq!(updated.overall_percentage, 42);

        let reloaded = store.get(&job.id).await.unwrap();
        assert_eq!(reloaded.overall_percentage, 42);
    }

    #[tokio::test]
    async fn test_concurrent_updates_keep_both_platform_outcomes() {
        let store: Arc<dyn JobStore> = Arc::new(SlowReadStore::default());
        let job = sample_job("user-1");
        store.put(&job).await.unwrap();

        let (a, b) = tokio::join!(
            store.update(&job.id, |j| {
                j.platform_mut(Platform::Instagram)
                    .complete("ig-1", "https://www.instagram.com/reel/1/");
            }),
            store.update(&job.id, |j| {
                j.platform_mut(Platform::Youtube)
                    .complete("yt-1", "https://youtu.be/yt-1");
            }),
        );
        a.unwrap();
        b.unwrap();

        let merged = store.get(&job.id).await.unwrap();
        assert_eq!(merged.instagram.external_id.as_deref(), Some("ig-1"));
        assert_eq!(merged.youtube.external_id.as_deref(), Some("yt-1"));
        assert_eq!(merged.terminal_status(), Some(JobStatus::Completed));
    }
}
