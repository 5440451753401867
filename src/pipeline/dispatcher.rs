use std::sync::Arc;
use tracing::info;

use super::queue::JobQueue;
use super::types::{GenerationMode, Job, Stage};
use crate::error::PipelineError;
use crate::storage::video::VideoStore;

/// Entry point used by the web layer to start a pipeline run. Fire and
/// forget: validates, enqueues a transcribe job, returns the job id.
pub struct Dispatcher {
    store: Arc<dyn VideoStore>,
    queue: Arc<dyn JobQueue>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn VideoStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    pub async fn submit(
        &self,
        video_id: i64,
        source_url: &str,
        generation_mode: GenerationMode,
    ) -> Result<String, PipelineError> {
        if source_url.trim().is_empty() {
            return Err(PipelineError::Validation(
                "source_url must not be empty".to_string(),
            ));
        }
        if self.store.get(video_id).await?.is_none() {
            return Err(PipelineError::NotFound(format!("video {}", video_id)));
        }
        // the submitted URL and mode become the row's, while it is Pending
        self.store
            .apply_submission(video_id, source_url, generation_mode)
            .await?;

        let job = Job::new(video_id, Stage::Transcribe);
        let job_id = job.id.clone();
        self.queue.enqueue(job).await?;

        info!("Dispatched video {} as job {}", video_id, job_id);
        Ok(job_id)
    }
}
