use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::error::PipelineError;
use crate::pipeline::types::{GenerationMode, StageResult};

pub mod http;

pub use http::HttpGenerationClient;

#[async_trait]
pub trait GenerationClient: Send + Sync + 'static {
    async fn complete(&self, prompt: &str) -> Result<String, PipelineError>;
}

fn summary_prompt(transcript: &str, ocr_text: &str, mode: GenerationMode) -> String {
    match mode {
        GenerationMode::Manual => format!(
            "You are writing an operation manual from a training video.\n\
             Rewrite the transcript below as a numbered, step-by-step manual\n\
             an operator can follow without watching the video. Fold in any\n\
             on-screen text where it clarifies a step.\n\n\
             Transcript:\n{}\n\nOn-screen text:\n{}",
            transcript, ocr_text
        ),
        GenerationMode::Minutes => format!(
            "You are writing meeting minutes from a recorded meeting.\n\
             Summarize the transcript below as minutes with three sections:\n\
             Agenda, Decisions, Action Items. Use the on-screen text for\n\
             names and figures where the transcript is unclear.\n\n\
             Transcript:\n{}\n\nOn-screen text:\n{}",
            transcript, ocr_text
        ),
    }
}

fn quiz_prompt(summary: &str) -> String {
    format!(
        "Write a short comprehension quiz (3-5 questions with answers)\n\
         covering the key points of the following summary. Number the\n\
         questions Q1, Q2, ... and put each answer on the line below its\n\
         question.\n\n\
         Summary:\n{}",
        summary
    )
}

/// Generation stage: summary and quiz calls, each independent, each with
/// isolated failure handling. A failed call is recorded as marker text and
/// the pipeline proceeds, keeping partial results visible to the end user.
pub struct Generator {
    client: Arc<dyn GenerationClient>,
}

impl Generator {
    pub fn new(client: Arc<dyn GenerationClient>) -> Self {
        Self { client }
    }

    pub async fn summary(
        &self,
        transcript: &str,
        ocr_text: &str,
        mode: GenerationMode,
    ) -> StageResult {
        let prompt = summary_prompt(transcript, ocr_text, mode);
        match self.client.complete(&prompt).await {
            Ok(text) => StageResult::success(text),
            Err(e) => {
                warn!("Summary generation failed: {}", e);
                StageResult::failure(&e.to_string())
            }
        }
    }

    pub async fn quiz(&self, summary: &str) -> StageResult {
        let prompt = quiz_prompt(summary);
        match self.client.complete(&prompt).await {
            Ok(text) => StageResult::success(text),
            Err(e) => {
                warn!("Quiz generation failed: {}", e);
                StageResult::failure(&e.to_string())
            }
        }
    }
}
