use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

/// One discrete phase of video processing.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Transcribe,
    Summarize,
    GenerateQuiz,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Processing status of a video. Forward stages carry a rank; a video only
/// moves up the rank order or sideways into its stage's failure terminal.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum VideoStatus {
    Pending,
    Transcribing,
    Transcribed,
    Summarizing,
    Summarized,
    QuizGenerating,
    Completed,
    FailedTranscription,
    FailedSummary,
    FailedQuiz,
}

impl VideoStatus {
    /// Position in the forward chain. Failure terminals rank just past the
    /// stage they abort, so guards treat them as "already handled".
    pub fn rank(&self) -> u8 {
        match self {
            VideoStatus::Pending => 0,
            VideoStatus::Transcribing => 1,
            VideoStatus::Transcribed => 2,
            VideoStatus::FailedTranscription => 2,
            VideoStatus::Summarizing => 3,
            VideoStatus::Summarized => 4,
            VideoStatus::FailedSummary => 4,
            VideoStatus::QuizGenerating => 5,
            VideoStatus::Completed => 6,
            VideoStatus::FailedQuiz => 6,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VideoStatus::Completed
                | VideoStatus::FailedTranscription
                | VideoStatus::FailedSummary
                | VideoStatus::FailedQuiz
        )
    }

    /// True once the video is at or past `other` in the forward chain.
    pub fn is_past(&self, other: VideoStatus) -> bool {
        self.rank() >= other.rank()
    }
}

impl Display for VideoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl TryFrom<&str> for VideoStatus {
    type Error = String;
    fn try_from(status: &str) -> Result<Self, Self::Error> {
        match status {
            "Pending" => Ok(VideoStatus::Pending),
            "Transcribing" => Ok(VideoStatus::Transcribing),
            "Transcribed" => Ok(VideoStatus::Transcribed),
            "Summarizing" => Ok(VideoStatus::Summarizing),
            "Summarized" => Ok(VideoStatus::Summarized),
            "QuizGenerating" => Ok(VideoStatus::QuizGenerating),
            "Completed" => Ok(VideoStatus::Completed),
            "FailedTranscription" => Ok(VideoStatus::FailedTranscription),
            "FailedSummary" => Ok(VideoStatus::FailedSummary),
            "FailedQuiz" => Ok(VideoStatus::FailedQuiz),
            _ => Err(format!("Invalid video status: {}", status)),
        }
    }
}

/// Summary prompt selector.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// Step-by-step operation manual.
    Manual,
    /// Meeting minutes: agenda, decisions, action items.
    Minutes,
}

impl Default for GenerationMode {
    fn default() -> Self {
        Self::Manual
    }
}

impl Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationMode::Manual => write!(f, "manual"),
            GenerationMode::Minutes => write!(f, "minutes"),
        }
    }
}

impl TryFrom<&str> for GenerationMode {
    type Error = String;
    fn try_from(mode: &str) -> Result<Self, Self::Error> {
        match mode {
            "manual" => Ok(GenerationMode::Manual),
            "minutes" => Ok(GenerationMode::Minutes),
            _ => Err(format!("Invalid generation mode: {}", mode)),
        }
    }
}

/// One queued attempt to advance a video. Lives only inside the broker;
/// dedup is the stage handlers' job, keyed by `idempotency_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub video_id: i64,
    pub stage: Stage,
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
    pub idempotency_key: String,
}

impl Job {
    pub fn new(video_id: i64, stage: Stage) -> Self {
        Self {
            id: format!("job-{}", Uuid::new_v4()),
            video_id,
            stage,
            attempt: 0,
            enqueued_at: Utc::now(),
            idempotency_key: format!("{}:{}", video_id, stage),
        }
    }
}

/// Outcome of one generation call. A failed call still produces text — the
/// failure marker — so partial progress stays visible to the end user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub ok: bool,
    pub text: String,
}

impl StageResult {
    pub fn success(text: String) -> Self {
        Self { ok: true, text }
    }

    pub fn failure(reason: &str) -> Self {
        Self {
            ok: false,
            text: format!("[generation failed] {}", reason),
        }
    }
}
