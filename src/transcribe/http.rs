use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::{CorrelationMap, RetryPolicy, TranscribeOutcome, TranscriptionClient};
use crate::error::PipelineError;

#[derive(Debug, Serialize)]
struct TranscribeRequest<'a> {
    video_url: &'a str,
    video_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
    correlation_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: Option<String>,
    error: Option<String>,
    correlation_id: Option<String>,
}

/// Client for the external transcription service. Depending on deployment
/// the service answers inline (200 + text) or accepts and calls back later
/// (202); both are normalized into `TranscribeOutcome`.
pub struct HttpTranscriptionClient {
    client: reqwest::Client,
    api_url: String,
    callback_url: Option<String>,
    retry: RetryPolicy,
    correlations: Arc<CorrelationMap>,
}

impl HttpTranscriptionClient {
    pub fn new(
        api_url: String,
        callback_url: Option<String>,
        timeout: Duration,
        retry: RetryPolicy,
        correlations: Arc<CorrelationMap>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url,
            callback_url,
            retry,
            correlations,
        })
    }

    async fn request_once(
        &self,
        video_id: i64,
        source_url: &str,
    ) -> Result<TranscribeOutcome, PipelineError> {
        // registered before the request leaves, so a callback racing the
        // 202 response can already resolve it
        let correlation_id = format!("corr-{}", Uuid::new_v4());
        self.correlations.register(correlation_id.clone(), video_id);

        let outcome = self.exchange(video_id, source_url, &correlation_id).await;
        if !matches!(outcome, Ok(TranscribeOutcome::Pending(_))) {
            // callback mode was not taken; drop the provisional entry
            self.correlations.resolve(&correlation_id);
        }
        outcome
    }

    async fn exchange(
        &self,
        video_id: i64,
        source_url: &str,
        correlation_id: &str,
    ) -> Result<TranscribeOutcome, PipelineError> {
        let payload = TranscribeRequest {
            video_url: source_url,
            video_id,
            callback_url: self.callback_url.as_deref(),
            correlation_id,
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    PipelineError::UpstreamTransient(e.to_string())
                } else {
                    PipelineError::UpstreamPermanent(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            // some deployments assign their own id in the 202 body; keep
            // both registered, either resolves to this video
            let correlation_id = match response
                .json::<TranscribeResponse>()
                .await
                .ok()
                .and_then(|b| b.correlation_id)
            {
                Some(service_id) if service_id != correlation_id => {
                    self.correlations.register(service_id.clone(), video_id);
                    service_id
                }
                _ => correlation_id.to_string(),
            };
            info!(
                "Transcription accepted for video {}, awaiting callback {}",
                video_id, correlation_id
            );
            return Ok(TranscribeOutcome::Pending(correlation_id));
        }

        if status.is_server_error() {
            return Err(PipelineError::UpstreamTransient(format!(
                "transcription service returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(PipelineError::UpstreamPermanent(format!(
                "transcription service returned {}",
                status
            )));
        }

        let body: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::UpstreamPermanent(format!("malformed body: {}", e)))?;

        if let Some(error) = body.error {
            return Err(PipelineError::UpstreamPermanent(error));
        }
        match body.text {
            Some(text) => Ok(TranscribeOutcome::Sync(text)),
            None => Err(PipelineError::UpstreamPermanent(
                "response carried neither text nor error".to_string(),
            )),
        }
    }
}

#[async_trait]
impl TranscriptionClient for HttpTranscriptionClient {
    async fn request(
        &self,
        video_id: i64,
        source_url: &str,
    ) -> Result<TranscribeOutcome, PipelineError> {
        let result = self
            .retry
            .run("transcription request", || {
                self.request_once(video_id, source_url)
            })
            .await;

        match result {
            Ok(outcome) => Ok(outcome),
            // the retry budget is the adapter's; spent budget is a stage
            // failure, not an error the pipeline needs to classify again
            Err(PipelineError::UpstreamTransient(reason))
            | Err(PipelineError::UpstreamPermanent(reason)) => {
                Ok(TranscribeOutcome::Failed(reason))
            }
            Err(e) => Err(e),
        }
    }
}
