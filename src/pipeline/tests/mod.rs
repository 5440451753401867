use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::PipelineError;
use crate::generate::{GenerationClient, Generator};
use crate::pipeline::dispatcher::Dispatcher;
use crate::pipeline::engine::PipelineEngine;
use crate::pipeline::queue::{InProcessQueue, JobQueue};
use crate::pipeline::types::{GenerationMode, Job, Stage, VideoStatus};
use crate::storage::video::{NewVideo, SqliteVideoStore, VideoStore};
use crate::transcribe::{RetryPolicy, TranscribeOutcome, TranscriptionClient};

/// Plays back a scripted sequence of outcomes, one per request.
struct ScriptedTranscriber {
    outcomes: Mutex<VecDeque<TranscribeOutcome>>,
    calls: AtomicU32,
}

impl ScriptedTranscriber {
    fn new(outcomes: Vec<TranscribeOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptionClient for ScriptedTranscriber {
    async fn request(
        &self,
        _video_id: i64,
        _source_url: &str,
    ) -> Result<TranscribeOutcome, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .expect("transcriber called more times than scripted");
        Ok(outcome)
    }
}

/// Times out on every attempt, the way a wedged deployment does. Applies the
/// same retry policy the HTTP adapter applies, so the engine sees `Failed`
/// only once the budget is spent.
struct TimingOutTranscriber {
    retry: RetryPolicy,
    calls: AtomicU32,
}

#[async_trait]
impl TranscriptionClient for TimingOutTranscriber {
    async fn request(
        &self,
        _video_id: i64,
        _source_url: &str,
    ) -> Result<TranscribeOutcome, PipelineError> {
        let result: Result<(), _> = self
            .retry
            .run("transcription request", || {
                self.calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(PipelineError::UpstreamTransient(
                        "request timed out".to_string(),
                    ))
                }
            })
            .await;
        match result {
            Err(PipelineError::UpstreamTransient(reason)) => Ok(TranscribeOutcome::Failed(reason)),
            _ => unreachable!(),
        }
    }
}

/// Answers summary and quiz prompts by template, with per-call failure
/// switches mirroring "each call has isolated failure handling".
struct FakeGeneration {
    fail_summary: bool,
    fail_quiz: bool,
    summary_calls: AtomicU32,
    quiz_calls: AtomicU32,
    last_quiz_prompt: Mutex<Option<String>>,
}

impl FakeGeneration {
    fn new(fail_summary: bool, fail_quiz: bool) -> Self {
        Self {
            fail_summary,
            fail_quiz,
            summary_calls: AtomicU32::new(0),
            quiz_calls: AtomicU32::new(0),
            last_quiz_prompt: Mutex::new(None),
        }
    }
}

#[async_trait]
impl GenerationClient for FakeGeneration {
    async fn complete(&self, prompt: &str) -> Result<String, PipelineError> {
        if prompt.contains("comprehension quiz") {
            self.quiz_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_quiz_prompt.lock().unwrap() = Some(prompt.to_string());
            if self.fail_quiz {
                Err(PipelineError::UpstreamTransient("quiz model down".into()))
            } else {
                Ok("Q1: What do you turn?\nA1: The knob.".to_string())
            }
        } else {
            self.summary_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_summary {
                Err(PipelineError::UpstreamTransient("summary model down".into()))
            } else {
                Ok("Manual: 1. Turn the knob.".to_string())
            }
        }
    }
}

struct Harness {
    store: Arc<SqliteVideoStore>,
    queue: Arc<InProcessQueue>,
    engine: PipelineEngine,
    dispatcher: Dispatcher,
}

impl Harness {
    async fn new(
        transcriber: Arc<dyn TranscriptionClient>,
        generation: Arc<FakeGeneration>,
    ) -> Result<Self> {
        let store = Arc::new(SqliteVideoStore::new("sqlite::memory:").await?);
        let queue = Arc::new(InProcessQueue::new());
        let engine = PipelineEngine::new(
            store.clone(),
            transcriber,
            Generator::new(generation),
        );
        let dispatcher = Dispatcher::new(store.clone(), queue.clone());
        Ok(Self {
            store,
            queue,
            engine,
            dispatcher,
        })
    }

    async fn create_video(&self, mode: GenerationMode) -> Result<i64> {
        self.store
            .create(&NewVideo {
                title: Some("test video".to_string()),
                source_url: "https://cdn.example.com/v/test.mp4".to_string(),
                generation_mode: mode,
                ocr_text: None,
            })
            .await
    }

    /// Drains and runs exactly one delivered job, like a worker iteration.
    async fn run_next_job(&self) -> Result<Job> {
        let job = tokio::time::timeout(Duration::from_secs(1), self.queue.recv())
            .await
            .expect("no job delivered in time")
            .expect("queue closed");
        self.engine.run(&job).await?;
        Ok(job)
    }

    async fn status(&self, video_id: i64) -> Result<VideoStatus> {
        Ok(self.store.get(video_id).await?.unwrap().status)
    }
}

#[tokio::test]
async fn test_sync_transcription_runs_to_completion() -> Result<()> {
    let transcriber = Arc::new(ScriptedTranscriber::new(vec![TranscribeOutcome::Sync(
        "turn the knob".to_string(),
    )]));
    let generation = Arc::new(FakeGeneration::new(false, false));
    let h = Harness::new(transcriber.clone(), generation).await?;

    let v1 = h.create_video(GenerationMode::Manual).await?;
    h.dispatcher
        .submit(v1, "https://cdn.example.com/v/test.mp4", GenerationMode::Manual)
        .await?;
    h.run_next_job().await?;

    let video = h.store.get(v1).await?.unwrap();
    assert_eq!(video.status, VideoStatus::Completed);
    assert_eq!(video.transcript.as_deref(), Some("turn the knob"));
    assert_eq!(video.summary.as_deref(), Some("Manual: 1. Turn the knob."));

    let quiz = h.store.get_quiz(v1).await?.expect("quiz row created");
    assert_eq!(
        quiz.quiz_text.as_deref(),
        Some("Q1: What do you turn?\nA1: The knob.")
    );
    assert_eq!(transcriber.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_pending_transcription_completes_via_callback() -> Result<()> {
    let transcriber = Arc::new(ScriptedTranscriber::new(vec![TranscribeOutcome::Pending(
        "corr-123".to_string(),
    )]));
    let generation = Arc::new(FakeGeneration::new(false, false));
    let h = Harness::new(transcriber.clone(), generation.clone()).await?;

    let v2 = h.create_video(GenerationMode::Minutes).await?;
    h.dispatcher
        .submit(v2, "https://cdn.example.com/v/test.mp4", GenerationMode::Minutes)
        .await?;
    h.run_next_job().await?;

    // worker parked the video awaiting the callback
    assert_eq!(h.status(v2).await?, VideoStatus::Transcribing);

    // the callback alone drives it to completion, no further queue message
    h.engine
        .complete_transcription(v2, Ok("hello".to_string()))
        .await?;

    let video = h.store.get(v2).await?.unwrap();
    assert_eq!(video.status, VideoStatus::Completed);
    assert_eq!(video.transcript.as_deref(), Some("hello"));
    assert!(h.store.get_quiz(v2).await?.is_some());
    assert_eq!(transcriber.calls(), 1);
    assert_eq!(generation.summary_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_transcription_timeout_exhausts_retries_and_fails() -> Result<()> {
    let transcriber = Arc::new(TimingOutTranscriber {
        retry: RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
        },
        calls: AtomicU32::new(0),
    });
    let generation = Arc::new(FakeGeneration::new(false, false));
    let h = Harness::new(transcriber.clone(), generation.clone()).await?;

    let v3 = h.create_video(GenerationMode::Manual).await?;
    h.dispatcher
        .submit(v3, "https://cdn.example.com/v/test.mp4", GenerationMode::Manual)
        .await?;
    h.run_next_job().await?;

    let video = h.store.get(v3).await?.unwrap();
    assert_eq!(video.status, VideoStatus::FailedTranscription);
    assert_eq!(
        video.transcript.as_deref(),
        Some("[transcription failed] request timed out")
    );
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 3);

    // no downstream stage ran
    assert_eq!(generation.summary_calls.load(Ordering::SeqCst), 0);
    assert_eq!(generation.quiz_calls.load(Ordering::SeqCst), 0);
    assert!(h.store.get_quiz(v3).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_duplicate_job_delivery_does_not_repeat_side_effects() -> Result<()> {
    let transcriber = Arc::new(ScriptedTranscriber::new(vec![TranscribeOutcome::Sync(
        "once only".to_string(),
    )]));
    let generation = Arc::new(FakeGeneration::new(false, false));
    let h = Harness::new(transcriber.clone(), generation.clone()).await?;

    let id = h.create_video(GenerationMode::Manual).await?;
    h.dispatcher
        .submit(id, "https://cdn.example.com/v/test.mp4", GenerationMode::Manual)
        .await?;
    let job = h.run_next_job().await?;
    assert_eq!(h.status(id).await?, VideoStatus::Completed);

    // broker redelivers the same job; every handler must be a no-op
    h.engine.run(&job).await?;
    h.engine.run(&Job::new(id, Stage::Summarize)).await?;
    h.engine.run(&Job::new(id, Stage::GenerateQuiz)).await?;

    assert_eq!(h.status(id).await?, VideoStatus::Completed);
    assert_eq!(transcriber.calls(), 1);
    assert_eq!(generation.summary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(generation.quiz_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_callback_is_acknowledged_without_effects() -> Result<()> {
    let transcriber = Arc::new(ScriptedTranscriber::new(vec![TranscribeOutcome::Pending(
        "corr-1".to_string(),
    )]));
    let generation = Arc::new(FakeGeneration::new(false, false));
    let h = Harness::new(transcriber, generation.clone()).await?;

    let id = h.create_video(GenerationMode::Manual).await?;
    h.dispatcher
        .submit(id, "https://cdn.example.com/v/test.mp4", GenerationMode::Manual)
        .await?;
    h.run_next_job().await?;

    h.engine
        .complete_transcription(id, Ok("first delivery".to_string()))
        .await?;
    // the service redelivers with different text; transcript must not move
    h.engine
        .complete_transcription(id, Ok("second delivery".to_string()))
        .await?;

    let video = h.store.get(id).await?.unwrap();
    assert_eq!(video.status, VideoStatus::Completed);
    assert_eq!(video.transcript.as_deref(), Some("first delivery"));
    assert_eq!(generation.summary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(generation.quiz_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_redelivered_callback_resumes_stranded_generation() -> Result<()> {
    // the first callback committed the transcript, then crashed before the
    // generation stages; the service redelivers the callback
    let transcriber = Arc::new(ScriptedTranscriber::new(vec![]));
    let generation = Arc::new(FakeGeneration::new(false, false));
    let h = Harness::new(transcriber, generation.clone()).await?;

    let id = h.create_video(GenerationMode::Manual).await?;
    let mut update = crate::storage::video::StageUpdate::status(VideoStatus::Transcribed);
    update.transcript = Some("first delivery".to_string());
    h.store
        .update_stage(id, update, &[VideoStatus::Pending])
        .await?;

    h.engine
        .complete_transcription(id, Ok("second delivery".to_string()))
        .await?;

    let video = h.store.get(id).await?.unwrap();
    assert_eq!(video.status, VideoStatus::Completed);
    // the committed transcript never moves; only the missing stages ran
    assert_eq!(video.transcript.as_deref(), Some("first delivery"));
    assert_eq!(generation.summary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(generation.quiz_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_summary_failure_still_attempts_quiz_on_marker_text() -> Result<()> {
    let transcriber = Arc::new(ScriptedTranscriber::new(vec![TranscribeOutcome::Sync(
        "turn the knob".to_string(),
    )]));
    let generation = Arc::new(FakeGeneration::new(true, false));
    let h = Harness::new(transcriber, generation.clone()).await?;

    let id = h.create_video(GenerationMode::Manual).await?;
    h.dispatcher
        .submit(id, "https://cdn.example.com/v/test.mp4", GenerationMode::Manual)
        .await?;
    h.run_next_job().await?;

    let video = h.store.get(id).await?.unwrap();
    assert_eq!(video.status, VideoStatus::Completed);
    let summary = video.summary.unwrap();
    assert!(summary.starts_with("[generation failed]"));

    // quiz ran on whatever summary text was available, marker included
    assert_eq!(generation.quiz_calls.load(Ordering::SeqCst), 1);
    let quiz_prompt = generation.last_quiz_prompt.lock().unwrap().clone().unwrap();
    assert!(quiz_prompt.contains("[generation failed]"));
    assert!(h.store.get_quiz(id).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_quiz_failure_still_completes_with_marker_text() -> Result<()> {
    let transcriber = Arc::new(ScriptedTranscriber::new(vec![TranscribeOutcome::Sync(
        "turn the knob".to_string(),
    )]));
    let generation = Arc::new(FakeGeneration::new(false, true));
    let h = Harness::new(transcriber, generation).await?;

    let id = h.create_video(GenerationMode::Manual).await?;
    h.dispatcher
        .submit(id, "https://cdn.example.com/v/test.mp4", GenerationMode::Manual)
        .await?;
    h.run_next_job().await?;

    assert_eq!(h.status(id).await?, VideoStatus::Completed);
    let quiz = h.store.get_quiz(id).await?.unwrap();
    assert!(quiz.quiz_text.unwrap().starts_with("[generation failed]"));
    Ok(())
}

#[tokio::test]
async fn test_mis_sequenced_job_for_unstarted_stage_is_noop() -> Result<()> {
    let transcriber = Arc::new(ScriptedTranscriber::new(vec![]));
    let generation = Arc::new(FakeGeneration::new(false, false));
    let h = Harness::new(transcriber, generation.clone()).await?;

    let id = h.create_video(GenerationMode::Manual).await?;
    // a producer mis-sequenced: quiz and summary jobs before transcription
    h.engine.run(&Job::new(id, Stage::GenerateQuiz)).await?;
    h.engine.run(&Job::new(id, Stage::Summarize)).await?;

    assert_eq!(h.status(id).await?, VideoStatus::Pending);
    assert_eq!(generation.summary_calls.load(Ordering::SeqCst), 0);
    assert_eq!(generation.quiz_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_dispatcher_rejects_bad_submissions() -> Result<()> {
    let transcriber = Arc::new(ScriptedTranscriber::new(vec![]));
    let generation = Arc::new(FakeGeneration::new(false, false));
    let h = Harness::new(transcriber, generation).await?;

    let id = h.create_video(GenerationMode::Manual).await?;
    let err = h
        .dispatcher
        .submit(id, "  ", GenerationMode::Manual)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));

    let err = h
        .dispatcher
        .submit(id + 999, "https://cdn.example.com/v/x.mp4", GenerationMode::Manual)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn test_callback_for_missing_video_is_swallowed() -> Result<()> {
    let transcriber = Arc::new(ScriptedTranscriber::new(vec![]));
    let generation = Arc::new(FakeGeneration::new(false, false));
    let h = Harness::new(transcriber, generation).await?;

    // the transcription service cannot retry a permanently-missing video,
    // so the completion path must not surface an error
    h.engine
        .complete_transcription(424242, Ok("orphan".to_string()))
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_failed_transcription_blocks_late_callback() -> Result<()> {
    let transcriber = Arc::new(ScriptedTranscriber::new(vec![TranscribeOutcome::Failed(
        "service unreachable".to_string(),
    )]));
    let generation = Arc::new(FakeGeneration::new(false, false));
    let h = Harness::new(transcriber, generation.clone()).await?;

    let id = h.create_video(GenerationMode::Manual).await?;
    h.dispatcher
        .submit(id, "https://cdn.example.com/v/test.mp4", GenerationMode::Manual)
        .await?;
    h.run_next_job().await?;
    assert_eq!(h.status(id).await?, VideoStatus::FailedTranscription);

    // an out-of-order success callback arrives after the terminal state;
    // status never regresses
    h.engine
        .complete_transcription(id, Ok("too late".to_string()))
        .await?;

    let video = h.store.get(id).await?.unwrap();
    assert_eq!(video.status, VideoStatus::FailedTranscription);
    assert_eq!(
        video.transcript.as_deref(),
        Some("[transcription failed] service unreachable")
    );
    assert_eq!(generation.summary_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_dispatcher_records_submission_on_the_row() -> Result<()> {
    let transcriber = Arc::new(ScriptedTranscriber::new(vec![TranscribeOutcome::Sync(
        "we agreed to ship".to_string(),
    )]));
    let generation = Arc::new(FakeGeneration::new(false, false));
    let h = Harness::new(transcriber, generation).await?;

    let id = h.create_video(GenerationMode::Manual).await?;
    h.dispatcher
        .submit(id, "https://cdn.example.com/v/mtg.mp4", GenerationMode::Minutes)
        .await?;

    // the submitted URL and mode are what the pipeline will read back
    let video = h.store.get(id).await?.unwrap();
    assert_eq!(video.generation_mode, GenerationMode::Minutes);
    assert_eq!(video.source_url, "https://cdn.example.com/v/mtg.mp4");
    Ok(())
}

#[tokio::test]
async fn test_redelivered_job_resumes_video_stranded_after_transcription() -> Result<()> {
    // transcript committed, then a crash before any generation ran
    let transcriber = Arc::new(ScriptedTranscriber::new(vec![]));
    let generation = Arc::new(FakeGeneration::new(false, false));
    let h = Harness::new(transcriber.clone(), generation.clone()).await?;

    let id = h.create_video(GenerationMode::Manual).await?;
    let mut update = crate::storage::video::StageUpdate::status(VideoStatus::Transcribed);
    update.transcript = Some("turn the knob".to_string());
    h.store
        .update_stage(id, update, &[VideoStatus::Pending])
        .await?;

    // broker redelivery of the original transcribe job picks the run back up
    h.engine.run(&Job::new(id, Stage::Transcribe)).await?;

    let video = h.store.get(id).await?.unwrap();
    assert_eq!(video.status, VideoStatus::Completed);
    assert_eq!(video.transcript.as_deref(), Some("turn the knob"));
    assert_eq!(generation.summary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(generation.quiz_calls.load(Ordering::SeqCst), 1);
    assert!(h.store.get_quiz(id).await?.is_some());
    // and without re-issuing the external transcription request
    assert_eq!(transcriber.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_redelivered_job_resumes_video_stranded_after_summary() -> Result<()> {
    // summary committed, crash before the quiz stage
    let transcriber = Arc::new(ScriptedTranscriber::new(vec![]));
    let generation = Arc::new(FakeGeneration::new(false, false));
    let h = Harness::new(transcriber, generation.clone()).await?;

    let id = h.create_video(GenerationMode::Manual).await?;
    let mut update = crate::storage::video::StageUpdate::status(VideoStatus::Summarized);
    update.transcript = Some("turn the knob".to_string());
    update.summary = Some("Manual: 1. Turn the knob.".to_string());
    h.store
        .update_stage(id, update, &[VideoStatus::Pending])
        .await?;

    h.engine.run(&Job::new(id, Stage::Transcribe)).await?;

    let video = h.store.get(id).await?.unwrap();
    assert_eq!(video.status, VideoStatus::Completed);
    // the already-committed summary stage is not repeated
    assert_eq!(generation.summary_calls.load(Ordering::SeqCst), 0);
    assert_eq!(generation.quiz_calls.load(Ordering::SeqCst), 1);
    assert!(h.store.get_quiz(id).await?.is_some());
    Ok(())
}
