// Worker consumer loop
// One job at a time; parallelism comes from running more worker processes.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{JobQueue, QueuedJob};
use crate::processor::ProcessOutcome;
use crate::registry::JobRegistry;
use crate::types::QueueError;

/// Error class recorded when a worker pulls a job type it has no processor for.
pub const UNKNOWN_JOB_TYPE: &str = "UnknownJobType";

const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub done: usize,
    pub failed: usize,
    pub skipped: usize,
    pub dropped: usize,
}

impl WorkerStats {
    fn record(&mut self, outcome: &ProcessOutcome) {
        match outcome {
            ProcessOutcome::Done(_) => self.done += 1,
            ProcessOutcome::Failed(_) => self.failed += 1,
            ProcessOutcome::Skipped => self.skipped += 1,
        }
    }
}

pub struct Worker {
    id: String,
    registry: Arc<JobRegistry>,
    queue: Arc<dyn JobQueue>,
    poll_timeout: Duration,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        registry: Arc<JobRegistry>,
        queue: Arc<dyn JobQueue>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            registry,
            queue,
            poll_timeout,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Pull and process until `shutdown` is cancelled. Shutdown is observed
    /// between pulls, so a job that was already popped always runs.
    pub async fn run(&self, shutdown: CancellationToken) -> WorkerStats {
        info!(worker = %self.id, "Worker started");
        let mut stats = WorkerStats::default();

        while !shutdown.is_cancelled() {
            match self.run_once().await {
                Ok(Some(outcome)) => stats.record(&outcome),
                Ok(None) => {}
                Err(QueueError::Malformed(reason)) => {
                    warn!(worker = %self.id, %reason, "Dropping malformed queue entry");
                    stats.dropped += 1;
                }
                Err(e) => {
                    error!(worker = %self.id, error = %e, "Failed to pull from queue");
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        _ = tokio::time::sleep(QUEUE_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        info!(worker = %self.id, ?stats, "Worker stopped");
        stats
    }

    /// Wait up to the poll timeout for one job and process it.
    pub async fn run_once(&self) -> Result<Option<ProcessOutcome>, QueueError> {
        match self.queue.pop(self.poll_timeout).await? {
            Some(job) => Ok(Some(self.process_job(job).await)),
            None => Ok(None),
        }
    }

    pub async fn process_job(&self, job: QueuedJob) -> ProcessOutcome {
        let QueuedJob {
            job_type,
            request_id,
            params,
            ..
        } = job;

        match self.registry.processor_for(job_type, request_id.clone()) {
            Ok(processor) => processor.process(params).await,
            Err(e) => {
                error!(worker = %self.id, %job_type, %request_id, error = %e, "Cannot dispatch job");
                if let Err(e) = self
                    .registry
                    .status()
                    .set_error(job_type, request_id.as_str(), UNKNOWN_JOB_TYPE)
                    .await
                {
                    error!(worker = %self.id, %job_type, %request_id, error = %e, "Failed to record unknown job type");
                }
                ProcessOutcome::Failed(UNKNOWN_JOB_TYPE.to_string())
            }
        }
    }
}
