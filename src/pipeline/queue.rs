use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use super::types::Job;

/// Client seam for a broker with at-least-once delivery. A job may arrive
/// more than once and in any order, including relative to other jobs for the
/// same video; dedup is the stage handlers' responsibility via their status
/// guards, never the queue's.
#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    async fn enqueue(&self, job: Job) -> Result<()>;
    /// Next job, or None once the transport is closed. Workers call this in
    /// a loop; multiple workers may share one queue.
    async fn recv(&self) -> Option<Job>;
}

/// In-process transport backing `JobQueue` for single-node deployments and
/// tests. The receiver sits behind a mutex so a pool of workers can pull
/// from the same channel.
pub struct InProcessQueue {
    sender: mpsc::UnboundedSender<Job>,
    receiver: Mutex<mpsc::UnboundedReceiver<Job>>,
}

impl InProcessQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }
}

impl Default for InProcessQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InProcessQueue {
    async fn enqueue(&self, job: Job) -> Result<()> {
        debug!("Enqueuing job {} ({})", job.id, job.idempotency_key);
        self.sender
            .send(job)
            .map_err(|e| anyhow::anyhow!("queue closed: {}", e))
    }

    async fn recv(&self) -> Option<Job> {
        self.receiver.lock().await.recv().await
    }
}
