//! Job Registry
//!
//! Maps each job type to a processor factory, generates request ids and hands
//! work to the queue. Built once at startup and passed to whatever needs it;
//! there is no process-wide instance.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::models::{JobParams, StatusDocument};
use crate::processor::{JobHandler, JobProcessor, LeaseSettings, Process};
use crate::queue::{JobQueue, QueuedJob};
use crate::status::StatusManager;
use crate::types::{JobType, RegistryError, RequestId, StoreError};

/// Error class recorded when the queue rejects a job after PENDING was written.
pub const ENQUEUE_FAILED: &str = "EnqueueFailed";

pub type ProcessorFactory = Arc<dyn Fn(JobType, RequestId) -> Box<dyn Process> + Send + Sync>;

pub struct JobRegistry {
    status: StatusManager,
    queue: Arc<dyn JobQueue>,
    factories: HashMap<JobType, ProcessorFactory>,
}

impl JobRegistry {
    pub fn new(status: StatusManager, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            status,
            queue,
            factories: HashMap::new(),
        }
    }

    /// One factory per job type; registering again replaces the previous one.
    pub fn register<F>(&mut self, job_type: JobType, factory: F)
    where
        F: Fn(JobType, RequestId) -> Box<dyn Process> + Send + Sync + 'static,
    {
        self.factories.insert(job_type, Arc::new(factory));
    }

    /// Register a handler run through the standard [`JobProcessor`] workflow.
    pub fn register_handler<H: JobHandler>(&mut self, job_type: JobType, handler: Arc<H>, lease: LeaseSettings) {
        let status = self.status.clone();
        self.register(job_type, move |job_type, request_id| {
            Box::new(JobProcessor::new(
                job_type,
                request_id,
                handler.clone(),
                status.clone(),
                lease.clone(),
            ))
        });
    }

    pub fn is_registered(&self, job_type: JobType) -> bool {
        self.factories.contains_key(&job_type)
    }

    pub fn status(&self) -> &StatusManager {
        &self.status
    }

    /// A processor bound to `(job_type, request_id)`.
    pub fn processor_for(
        &self,
        job_type: JobType,
        request_id: RequestId,
    ) -> Result<Box<dyn Process>, RegistryError> {
        let factory = self
            .factories
            .get(&job_type)
            .ok_or(RegistryError::NotRegistered(job_type))?;
        Ok(factory(job_type, request_id))
    }

    /// Persist PENDING and push the job; returns without waiting for it to run.
    ///
    /// An unregistered job type fails before anything is written.
    pub async fn enqueue(&self, job_type: JobType, params: JobParams) -> Result<RequestId, RegistryError> {
        let request_id = RequestId::generate();
        let processor = self.processor_for(job_type, request_id.clone())?;

        self.status.set_pending(job_type, request_id.as_str()).await?;

        let job = QueuedJob::new(processor.job_type(), processor.request_id().clone(), params);
        if let Err(e) = self.queue.push(job).await {
            error!(%job_type, %request_id, error = %e, "Failed to enqueue job");
            if let Err(store_err) = self
                .status
                .set_error(job_type, request_id.as_str(), ENQUEUE_FAILED)
                .await
            {
                error!(%job_type, %request_id, error = %store_err, "Failed to record enqueue failure");
            }
            return Err(e.into());
        }

        info!(%job_type, %request_id, "Job enqueued");
        Ok(request_id)
    }

    pub async fn get_status(&self, job_type: JobType, id: &str) -> Result<Option<StatusDocument>, StoreError> {
        self.status.get_status(job_type, id).await
    }
}
