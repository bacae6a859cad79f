//! Retry for transient publish failures.

use std::time::Duration;

use tracing::warn;

use crate::error::{PublishError, PublishResult};

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 15000,
        }
    }
}

/// Run `op` with exponential backoff on transient errors. Credential and
/// rejection errors return immediately.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    op: F,
) -> PublishResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = PublishResult<T>>,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay_ms = config
                    .base_delay_ms
                    .saturating_mul(2u64.pow(attempt))
                    .min(config.max_delay_ms);

                warn!(
                    operation = %operation,
                    attempt = attempt + 1,
                    delay_ms,
                    "publish step failed, retrying: {}",
                    e
                );

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error
        .unwrap_or_else(|| PublishError::transient("unknown", "retries exhausted")))
}
