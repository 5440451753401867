use thiserror::Error;

/// Failure taxonomy for the processing pipeline.
///
/// Only `UpstreamTransient` is retryable; everything else is either surfaced
/// into the video's stage-failure text or swallowed as a duplicate delivery.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("transient upstream failure: {0}")]
    UpstreamTransient(String),

    #[error("permanent upstream failure: {0}")]
    UpstreamPermanent(String),

    /// A conditional stage update matched zero rows: another execution
    /// context already moved the video past the expected status.
    #[error("stale stage transition for video {video_id}")]
    Conflict { video_id: i64 },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::UpstreamTransient(_))
    }
}
