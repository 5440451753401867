use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::types::{GenerationMode, VideoStatus};

/// A unit of work. Created by the upload flow; mutated only through
/// `VideoStore::update_stage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: i64,
    pub title: Option<String>,
    pub source_url: String,
    pub status: VideoStatus,
    pub generation_mode: GenerationMode,
    /// Transcript text; holds the failure reason on FailedTranscription.
    pub transcript: Option<String>,
    /// Supplied externally, read-only to the pipeline.
    pub ocr_text: Option<String>,
    pub summary: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert shape used by the upload flow and by tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVideo {
    pub title: Option<String>,
    pub source_url: String,
    pub generation_mode: GenerationMode,
    pub ocr_text: Option<String>,
}

/// Derived artifact, at most one row per video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub video_id: i64,
    pub title: Option<String>,
    pub quiz_text: Option<String>,
}
