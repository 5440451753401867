use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::types::{Job, Stage, StageResult, VideoStatus};
use crate::generate::Generator;
use crate::storage::video::{StageUpdate, UpdateOutcome, Video, VideoStore};
use crate::transcribe::{TranscribeOutcome, TranscriptionClient};

/// Drives a video through its processing stages. Every handler re-reads the
/// video's status before acting and commits through a conditional update, so
/// duplicate queue deliveries and duplicate callbacks collapse into no-ops.
/// No database work is held across an external call.
pub struct PipelineEngine {
    store: Arc<dyn VideoStore>,
    transcriber: Arc<dyn TranscriptionClient>,
    generator: Generator,
}

impl PipelineEngine {
    pub fn new(
        store: Arc<dyn VideoStore>,
        transcriber: Arc<dyn TranscriptionClient>,
        generator: Generator,
    ) -> Self {
        Self {
            store,
            transcriber,
            generator,
        }
    }

    pub fn store(&self) -> &Arc<dyn VideoStore> {
        &self.store
    }

    pub async fn run(&self, job: &Job) -> Result<()> {
        debug!("Running job {} ({})", job.id, job.idempotency_key);
        match job.stage {
            Stage::Transcribe => self.handle_transcribe(job.video_id).await,
            Stage::Summarize | Stage::GenerateQuiz => self.run_generation(job.video_id).await,
        }
    }

    async fn load(&self, video_id: i64) -> Result<Option<Video>> {
        let video = self.store.get(video_id).await?;
        if video.is_none() {
            warn!("Video {} not found, dropping work", video_id);
        }
        Ok(video)
    }

    pub async fn handle_transcribe(&self, video_id: i64) -> Result<()> {
        let Some(video) = self.load(video_id).await? else {
            return Ok(());
        };
        if video.status.is_past(VideoStatus::Transcribed) {
            if video.status.is_terminal() {
                debug!(
                    "Video {} already {}, ignoring duplicate transcribe job",
                    video_id, video.status
                );
                return Ok(());
            }
            // transcript committed but a crash cut the run short before the
            // generation stages finished; broker redelivery resumes it
            info!(
                "Video {} redelivered at {}, resuming generation",
                video_id, video.status
            );
            return self.run_generation(video_id).await;
        }

        // Transcribing -> Transcribing is allowed so a redelivered job can
        // re-issue the external request after a crash mid-call.
        let outcome = self
            .store
            .update_stage(
                video_id,
                StageUpdate::status(VideoStatus::Transcribing),
                &[VideoStatus::Pending, VideoStatus::Transcribing],
            )
            .await?;
        if outcome == UpdateOutcome::Stale {
            debug!("Video {} moved past Pending concurrently", video_id);
            return Ok(());
        }
        info!("Video {}: Transcribing", video_id);

        match self.transcriber.request(video_id, &video.source_url).await? {
            TranscribeOutcome::Sync(text) => {
                self.complete_transcription(video_id, Ok(text)).await
            }
            TranscribeOutcome::Pending(correlation_id) => {
                info!(
                    "Video {}: transcription pending, correlation {}",
                    video_id, correlation_id
                );
                Ok(())
            }
            TranscribeOutcome::Failed(reason) => {
                self.complete_transcription(video_id, Err(reason)).await
            }
        }
    }

    /// Uniform completion entry: fed by the synchronous adapter path and by
    /// the callback receiver alike.
    pub async fn complete_transcription(
        &self,
        video_id: i64,
        result: std::result::Result<String, String>,
    ) -> Result<()> {
        let Some(video) = self.load(video_id).await? else {
            return Ok(());
        };
        if video.status.is_past(VideoStatus::Transcribed) {
            if video.status.is_terminal() {
                debug!(
                    "Video {} already {}, ignoring duplicate transcription completion",
                    video_id, video.status
                );
                return Ok(());
            }
            // duplicate delivery while the run sits mid-chain; the guards
            // keep committed stages from repeating, so finishing the rest
            // produces no duplicate work
            info!(
                "Video {} duplicate completion at {}, resuming generation",
                video_id, video.status
            );
            return self.run_generation(video_id).await;
        }

        match result {
            Ok(text) => {
                let mut update = StageUpdate::status(VideoStatus::Transcribed);
                update.transcript = Some(text);
                let outcome = self
                    .store
                    .update_stage(
                        video_id,
                        update,
                        &[VideoStatus::Pending, VideoStatus::Transcribing],
                    )
                    .await?;
                if outcome == UpdateOutcome::Stale {
                    debug!("Video {} transcription already committed", video_id);
                    return Ok(());
                }
                info!("Video {}: Transcribed", video_id);
                self.run_generation(video_id).await
            }
            Err(reason) => {
                // failure text lands in the transcript field so the end user
                // sees why there is no transcript, not a silent gap
                let mut update = StageUpdate::status(VideoStatus::FailedTranscription);
                update.transcript = Some(format!("[transcription failed] {}", reason));
                update.last_error = Some(reason.clone());
                let outcome = self
                    .store
                    .update_stage(
                        video_id,
                        update,
                        &[VideoStatus::Pending, VideoStatus::Transcribing],
                    )
                    .await?;
                if outcome == UpdateOutcome::Applied {
                    error!("Video {}: FailedTranscription ({})", video_id, reason);
                }
                Ok(())
            }
        }
    }

    /// Summary stage then quiz stage, each committed as its own narrow
    /// transition. Generation failures do not abort: the marker text is
    /// persisted and the pipeline advances (partial results over none).
    pub async fn run_generation(&self, video_id: i64) -> Result<()> {
        self.run_summary(video_id).await?;
        self.run_quiz(video_id).await
    }

    async fn run_summary(&self, video_id: i64) -> Result<()> {
        let Some(video) = self.load(video_id).await? else {
            return Ok(());
        };
        if video.status.is_past(VideoStatus::Summarized) {
            debug!(
                "Video {} already {}, skipping summary stage",
                video_id, video.status
            );
            return Ok(());
        }
        if video.status != VideoStatus::Transcribed && video.status != VideoStatus::Summarizing {
            debug!(
                "Video {} not yet transcribed ({}), skipping summary stage",
                video_id, video.status
            );
            return Ok(());
        }

        let outcome = self
            .store
            .update_stage(
                video_id,
                StageUpdate::status(VideoStatus::Summarizing),
                &[VideoStatus::Transcribed, VideoStatus::Summarizing],
            )
            .await?;
        if outcome == UpdateOutcome::Stale {
            return Ok(());
        }
        info!("Video {}: Summarizing", video_id);

        let transcript = video.transcript.unwrap_or_default();
        let ocr_text = video.ocr_text.unwrap_or_default();
        let result = self
            .generator
            .summary(&transcript, &ocr_text, video.generation_mode)
            .await;

        self.commit_stage_result(
            video_id,
            VideoStatus::Summarized,
            &[VideoStatus::Summarizing],
            result,
            |update, text| update.summary = Some(text),
        )
        .await
    }

    async fn run_quiz(&self, video_id: i64) -> Result<()> {
        let Some(video) = self.load(video_id).await? else {
            return Ok(());
        };
        if video.status.is_past(VideoStatus::Completed) {
            debug!(
                "Video {} already {}, skipping quiz stage",
                video_id, video.status
            );
            return Ok(());
        }
        if video.status != VideoStatus::Summarized && video.status != VideoStatus::QuizGenerating {
            debug!(
                "Video {} not yet summarized ({}), skipping quiz stage",
                video_id, video.status
            );
            return Ok(());
        }

        let outcome = self
            .store
            .update_stage(
                video_id,
                StageUpdate::status(VideoStatus::QuizGenerating),
                &[VideoStatus::Summarized, VideoStatus::QuizGenerating],
            )
            .await?;
        if outcome == UpdateOutcome::Stale {
            return Ok(());
        }
        info!("Video {}: QuizGenerating", video_id);

        // quiz runs on whatever summary text exists, failure marker included
        let summary = video.summary.unwrap_or_default();
        let result = self.generator.quiz(&summary).await;

        self.store
            .upsert_quiz(video_id, video.title.as_deref(), &result.text)
            .await?;

        self.commit_stage_result(
            video_id,
            VideoStatus::Completed,
            &[VideoStatus::QuizGenerating],
            result,
            |_, _| {},
        )
        .await
    }

    async fn commit_stage_result(
        &self,
        video_id: i64,
        next: VideoStatus,
        expected: &[VideoStatus],
        result: StageResult,
        apply: impl FnOnce(&mut StageUpdate, String),
    ) -> Result<()> {
        let mut update = StageUpdate::status(next);
        if !result.ok {
            update.last_error = Some(result.text.clone());
        }
        apply(&mut update, result.text);

        let outcome = self.store.update_stage(video_id, update, expected).await?;
        match outcome {
            UpdateOutcome::Applied => {
                if result.ok {
                    info!("Video {}: {}", video_id, next);
                } else {
                    warn!("Video {}: {} with failure text persisted", video_id, next);
                }
            }
            UpdateOutcome::Stale => {
                debug!("Video {}: stale commit into {}", video_id, next);
            }
        }
        Ok(())
    }
}
