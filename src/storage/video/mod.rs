use anyhow::Result;
use async_trait::async_trait;

use crate::pipeline::types::{GenerationMode, VideoStatus};

pub mod entity;
pub mod sqlite;

pub use entity::{NewVideo, Quiz, Video};
pub use sqlite::SqliteVideoStore;

/// Fields written by one stage transition. `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct StageUpdate {
    pub status: Option<VideoStatus>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub last_error: Option<String>,
}

impl StageUpdate {
    pub fn status(status: VideoStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Result of a conditional stage update. `Stale` means the row's current
/// status was not among the expected priors: another execution context got
/// there first, and the caller must treat the delivery as a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    Stale,
}

#[async_trait]
pub trait VideoStore: Send + Sync + 'static {
    async fn create(&self, video: &NewVideo) -> Result<i64>;
    async fn get(&self, video_id: i64) -> Result<Option<Video>>;
    /// Single conditional UPDATE guarded by the expected prior statuses.
    async fn update_stage(
        &self,
        video_id: i64,
        update: StageUpdate,
        expected_prior: &[VideoStatus],
    ) -> Result<UpdateOutcome>;
    /// Submission parameters written by the dispatcher; a no-op once
    /// processing has moved past Pending, so a redispatch cannot change a
    /// run already underway.
    async fn apply_submission(
        &self,
        video_id: i64,
        source_url: &str,
        mode: GenerationMode,
    ) -> Result<()>;
    async fn get_quiz(&self, video_id: i64) -> Result<Option<Quiz>>;
    /// Get-or-create keyed by video id; never a second row.
    async fn upsert_quiz(&self, video_id: i64, title: Option<&str>, text: &str) -> Result<()>;
}
