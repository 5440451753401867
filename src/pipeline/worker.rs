use std::sync::Arc;
use tracing::{error, info};

use super::engine::PipelineEngine;
use super::queue::JobQueue;

/// One member of the worker pool: pulls jobs off the shared queue and hands
/// them to the engine until the transport closes. A failing job never kills
/// the loop.
pub struct PipelineWorker {
    engine: Arc<PipelineEngine>,
    queue: Arc<dyn JobQueue>,
}

impl PipelineWorker {
    pub fn new(engine: Arc<PipelineEngine>, queue: Arc<dyn JobQueue>) -> Self {
        Self { engine, queue }
    }

    pub async fn run(&self) {
        while let Some(job) = self.queue.recv().await {
            info!("Worker picked up job {} ({})", job.id, job.idempotency_key);
            if let Err(e) = self.engine.run(&job).await {
                error!("Job {} failed: {:#}", job.id, e);
            }
        }
        info!("Queue closed, worker exiting");
    }
}
