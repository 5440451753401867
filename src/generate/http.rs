use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::GenerationClient;
use crate::error::PipelineError;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

/// Chat-completions client for the external text-generation service.
pub struct HttpGenerationClient {
    client: reqwest::Client,
    api_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl HttpGenerationClient {
    pub fn new(api_url: String, model: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url,
            model,
            temperature: 0.3,
            max_tokens: 2048,
        })
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn complete(&self, prompt: &str) -> Result<String, PipelineError> {
        let payload = CompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
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
        if status.is_server_error() {
            return Err(PipelineError::UpstreamTransient(format!(
                "generation service returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(PipelineError::UpstreamPermanent(format!(
                "generation service returned {}",
                status
            )));
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::UpstreamPermanent(format!("malformed body: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PipelineError::UpstreamPermanent("empty choices".to_string()))
    }
}
