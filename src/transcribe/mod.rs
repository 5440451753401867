use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

use crate::error::PipelineError;

pub mod http;

pub use http::HttpTranscriptionClient;

/// What one transcription request produced. The rest of the pipeline never
/// learns which integration mode the deployment uses.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscribeOutcome {
    /// The service answered inline.
    Sync(String),
    /// The service accepted the request and will deliver via callback.
    Pending(String),
    /// The call failed after the retry budget was spent.
    Failed(String),
}

#[async_trait]
pub trait TranscriptionClient: Send + Sync + 'static {
    async fn request(
        &self,
        video_id: i64,
        source_url: &str,
    ) -> Result<TranscribeOutcome, PipelineError>;
}

/// Bounded retry with exponential backoff, applied to transient failures
/// only. Permanent failures short-circuit.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    pub async fn run<F, Fut, T>(&self, label: &str, mut op: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        "{} attempt {}/{} failed ({}), retrying in {:?}",
                        label, attempt, self.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// correlation id -> video id, registered by the adapter when the service
/// answers 202 and consumed by the callback receiver.
#[derive(Debug, Default)]
pub struct CorrelationMap {
    inner: Mutex<HashMap<String, i64>>,
}

impl CorrelationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, correlation_id: String, video_id: i64) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(correlation_id, video_id);
    }

    /// Removes the entry; a second resolve of the same id returns None.
    pub fn resolve(&self, correlation_id: &str) -> Option<i64> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(correlation_id)
    }
}
