use std::sync::Arc;

pub mod dispatcher;
pub mod engine;
pub mod queue;
pub mod types;
pub mod worker;

pub use dispatcher::Dispatcher;
pub use engine::PipelineEngine;
pub use queue::{InProcessQueue, JobQueue};
pub use types::{GenerationMode, Job, Stage, StageResult, VideoStatus};
pub use worker::PipelineWorker;

use crate::generate::Generator;
use crate::storage::video::VideoStore;
use crate::transcribe::TranscriptionClient;

/// Convenience wiring: one engine plus a pool of workers sharing a queue.
pub fn spawn_workers(
    store: Arc<dyn VideoStore>,
    transcriber: Arc<dyn TranscriptionClient>,
    generator: Generator,
    queue: Arc<dyn JobQueue>,
    count: usize,
) -> Arc<PipelineEngine> {
    let engine = Arc::new(PipelineEngine::new(store, transcriber, generator));
    for _ in 0..count {
        let worker = PipelineWorker::new(engine.clone(), queue.clone());
        tokio::spawn(async move {
            worker.run().await;
        });
    }
    engine
}

#[cfg(test)]
mod tests;
