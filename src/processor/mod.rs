//! Job Processor
//!
//! Per-job template workflow. A [`JobHandler`] supplies the two job-specific
//! steps; [`JobProcessor`] drives them in a fixed order:
//!
//! 1. take the record lease (skip the run if another worker owns it, or if the
//!    record already reached DONE or ERROR on an earlier delivery)
//! 2. transition to WORKING
//! 3. `validate` the flat parameters into the handler's typed input
//! 4. `execute` the typed input into a result mapping
//! 5. transition to DONE with the result, or to ERROR with the error class
//!
//! Validation failure short-circuits: `execute` is never reached. Every
//! transition goes through the [`StatusManager`].
//!
//! While steps 3-4 run, a heartbeat renews the lease so the scheduler's
//! abandoned-work sweep can tell a live job from one whose worker died.

pub mod summarization;
pub mod transcription;

pub use summarization::SummarizationHandler;
pub use transcription::TranscriptionHandler;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::models::{JobParams, JobPayload};
use crate::status::StatusManager;
use crate::types::{ExecutionError, JobError, JobType, RequestId, ValidationError};

/// Job-type-specific capability plugged into the template workflow.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    type Input: Send;

    async fn validate(&self, params: &JobParams) -> Result<Self::Input, ValidationError>;

    async fn execute(&self, input: Self::Input) -> Result<JobPayload, ExecutionError>;
}

/// Result of one `process` call, mirrored by what was persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Done(JobPayload),
    Failed(String),
    /// Another worker holds the lease for this record.
    Skipped,
}

/// Object-safe entry point the registry and the worker dispatch through.
#[async_trait]
pub trait Process: Send + Sync {
    fn job_type(&self) -> JobType;

    fn request_id(&self) -> &RequestId;

    async fn process(&self, params: JobParams) -> ProcessOutcome;
}

/// Who holds a record while it runs, and for how long without a heartbeat.
#[derive(Debug, Clone)]
pub struct LeaseSettings {
    pub owner: String,
    pub ttl: Duration,
}

impl LeaseSettings {
    pub fn new(owner: impl Into<String>, ttl: Duration) -> Self {
        Self {
            owner: owner.into(),
            ttl,
        }
    }

    fn heartbeat_period(&self) -> Duration {
        (self.ttl / 3).max(Duration::from_millis(10))
    }
}

pub struct JobProcessor<H: JobHandler> {
    job_type: JobType,
    request_id: RequestId,
    handler: Arc<H>,
    status: StatusManager,
    lease: LeaseSettings,
}

impl<H: JobHandler> JobProcessor<H> {
    pub fn new(
        job_type: JobType,
        request_id: RequestId,
        handler: Arc<H>,
        status: StatusManager,
        lease: LeaseSettings,
    ) -> Self {
        Self {
            job_type,
            request_id,
            handler,
            status,
            lease,
        }
    }

    async fn run(&self, params: JobParams) -> ProcessOutcome {
        let id = self.request_id.as_str();

        if let Err(e) = self.status.set_working(self.job_type, id).await {
            error!(job_type = %self.job_type, request_id = id, error = %e, "Failed to mark job as working");
        }

        match self.validate_and_execute(&params).await {
            Ok(result) => {
                if let Err(e) = self.status.set_done(self.job_type, id, result.clone()).await {
                    error!(job_type = %self.job_type, request_id = id, error = %e, "Failed to persist job result");
                }
                info!(job_type = %self.job_type, request_id = id, "Job completed");
                ProcessOutcome::Done(result)
            }
            Err(err) => {
                let class = err.class_name();
                error!(job_type = %self.job_type, request_id = id, error = %err, class, "Job failed");
                if let Err(e) = self.status.set_error(self.job_type, id, class).await {
                    error!(job_type = %self.job_type, request_id = id, error = %e, "Failed to persist job error");
                }
                ProcessOutcome::Failed(class.to_string())
            }
        }
    }

    async fn validate_and_execute(&self, params: &JobParams) -> Result<JobPayload, JobError> {
        let input = self.handler.validate(params).await?;
        let result = self.handler.execute(input).await?;
        Ok(result)
    }

    /// Checked while holding the lease, so no other worker can be mid-run.
    async fn already_finished(&self) -> bool {
        match self.status.get_record(self.job_type, self.request_id.as_str()).await {
            Ok(Some(record)) => record.status.is_terminal(),
            Ok(None) => false,
            Err(e) => {
                warn!(job_type = %self.job_type, request_id = %self.request_id, error = %e, "Failed to read job status");
                false
            }
        }
    }

    fn spawn_heartbeat(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let stop = token.clone();
        let status = self.status.clone();
        let job_type = self.job_type;
        let id = self.request_id.clone();
        let lease = self.lease.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(lease.heartbeat_period());
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        match status.renew_lease(job_type, id.as_str(), &lease.owner, lease.ttl).await {
                            Ok(true) => debug!(%job_type, request_id = %id, "Lease renewed"),
                            Ok(false) => warn!(%job_type, request_id = %id, "Lease lost while job is running"),
                            Err(e) => warn!(%job_type, request_id = %id, error = %e, "Failed to renew lease"),
                        }
                    }
                }
            }
        });

        token
    }
}

#[async_trait]
impl<H: JobHandler> Process for JobProcessor<H> {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    async fn process(&self, params: JobParams) -> ProcessOutcome {
        let id = self.request_id.as_str();
        info!(job_type = %self.job_type, request_id = id, "Starting job");

        match self
            .status
            .acquire_lease(self.job_type, id, &self.lease.owner, self.lease.ttl)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(job_type = %self.job_type, request_id = id, "Job already owned by another worker, skipping");
                return ProcessOutcome::Skipped;
            }
            Err(e) => {
                // Without a lease the sweep may reclaim this record; run anyway.
                warn!(job_type = %self.job_type, request_id = id, error = %e, "Failed to acquire lease");
            }
        }

        let outcome = if self.already_finished().await {
            warn!(job_type = %self.job_type, request_id = id, "Job already finished, skipping repeated delivery");
            ProcessOutcome::Skipped
        } else {
            let heartbeat = self.spawn_heartbeat();
            let outcome = self.run(params).await;
            heartbeat.cancel();
            outcome
        };

        if let Err(e) = self
            .status
            .release_lease(self.job_type, id, &self.lease.owner)
            .await
        {
            warn!(job_type = %self.job_type, request_id = id, error = %e, "Failed to release lease");
        }

        outcome
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::ScriptedHandler;
    use super::*;
    use crate::store::{MemoryStatusStore, StatusStore};
    use crate::types::JobStatus;
    use serde_json::{json, Value};

    fn setup() -> (Arc<MemoryStatusStore>, StatusManager) {
        let store = Arc::new(MemoryStatusStore::new());
        let status = StatusManager::new(store.clone());
        (store, status)
    }

    fn processor(
        handler: Arc<ScriptedHandler>,
        status: &StatusManager,
        id: &str,
    ) -> JobProcessor<ScriptedHandler> {
        JobProcessor::new(
            JobType::Summarization,
            RequestId::from(id),
            handler,
            status.clone(),
            LeaseSettings::new("worker-1", Duration::from_secs(30)),
        )
    }

    fn payload(value: Value) -> JobPayload {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_process_success() {
        let (store, status) = setup();
        status.set_pending(JobType::Summarization, "job").await.unwrap();
        let handler = Arc::new(ScriptedHandler::succeeding(payload(json!({ "summary": "x" }))));

        let outcome = processor(handler.clone(), &status, "job").process(JobParams::new()).await;

        assert_eq!(outcome, ProcessOutcome::Done(payload(json!({ "summary": "x" }))));
        let record = status.get_record(JobType::Summarization, "job").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Done);
        assert_eq!(record.payload.get("summary"), Some(&json!("x")));
        assert!(record.expires_at.is_some());
        assert!(!store.lease_exists(JobType::Summarization, "job").await.unwrap());
    }

    #[tokio::test]
    async fn test_process_validation_error_skips_execute() {
        let (_store, status) = setup();
        status.set_pending(JobType::Summarization, "job").await.unwrap();
        let handler = Arc::new(ScriptedHandler::rejecting(ValidationError::StrengthOutOfRange(9)));

        let outcome = processor(handler.clone(), &status, "job").process(JobParams::new()).await;

        assert_eq!(outcome, ProcessOutcome::Failed("StrengthOutOfRange".into()));
        assert_eq!(handler.executed(), 0);
        let doc = status.get_status(JobType::Summarization, "job").await.unwrap().unwrap();
        assert_eq!(
            Value::Object(doc),
            json!({ "status": "error", "error": "StrengthOutOfRange" })
        );
    }

    #[tokio::test]
    async fn test_process_execution_error_keeps_class_only() {
        let (_store, status) = setup();
        status.set_pending(JobType::Summarization, "job").await.unwrap();
        let handler = Arc::new(ScriptedHandler::failing(ExecutionError::Inference(
            "GPU exploded at /models/secret".into(),
        )));

        let outcome = processor(handler.clone(), &status, "job").process(JobParams::new()).await;

        assert_eq!(outcome, ProcessOutcome::Failed("Inference".into()));
        assert_eq!(handler.executed(), 1);
        let doc = status.get_status(JobType::Summarization, "job").await.unwrap().unwrap();
        assert_eq!(Value::Object(doc), json!({ "status": "error", "error": "Inference" }));
    }

    #[tokio::test]
    async fn test_record_is_working_while_executing() {
        let (store, status) = setup();
        status.set_pending(JobType::Summarization, "job").await.unwrap();
        let mut handler = ScriptedHandler::succeeding(payload(json!({ "summary": "x" })));
        handler.delay = Duration::from_millis(200);
        let job = processor(Arc::new(handler), &status, "job");

        let running = tokio::spawn(async move { job.process(JobParams::new()).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let record = status.get_record(JobType::Summarization, "job").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Working);
        assert!(store.lease_exists(JobType::Summarization, "job").await.unwrap());

        assert!(matches!(running.await.unwrap(), ProcessOutcome::Done(_)));
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_skipped() {
        let (store, status) = setup();
        status.set_pending(JobType::Summarization, "job").await.unwrap();
        store
            .acquire_lease(JobType::Summarization, "job", "worker-2", Duration::from_secs(30))
            .await
            .unwrap();
        let handler = Arc::new(ScriptedHandler::succeeding(JobPayload::new()));

        let outcome = processor(handler.clone(), &status, "job").process(JobParams::new()).await;

        assert_eq!(outcome, ProcessOutcome::Skipped);
        assert_eq!(handler.executed(), 0);
        let record = status.get_record(JobType::Summarization, "job").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_repeated_delivery_of_finished_job_is_skipped() {
        let (store, status) = setup();
        status.set_pending(JobType::Summarization, "job").await.unwrap();
        let handler = Arc::new(ScriptedHandler::succeeding(payload(json!({ "summary": "x" }))));

        let first = processor(handler.clone(), &status, "job").process(JobParams::new()).await;
        let before = status.get_status(JobType::Summarization, "job").await.unwrap().unwrap();
        let second = processor(handler.clone(), &status, "job").process(JobParams::new()).await;

        assert!(matches!(first, ProcessOutcome::Done(_)));
        assert_eq!(second, ProcessOutcome::Skipped);
        assert_eq!(handler.executed(), 1);
        assert_eq!(status.get_status(JobType::Summarization, "job").await.unwrap().unwrap(), before);
        assert!(!store.lease_exists(JobType::Summarization, "job").await.unwrap());
    }

    #[tokio::test]
    async fn test_repeated_delivery_of_failed_job_is_skipped() {
        let (_store, status) = setup();
        status.set_error(JobType::Summarization, "job", "Inference").await.unwrap();
        let handler = Arc::new(ScriptedHandler::succeeding(payload(json!({ "summary": "x" }))));

        let outcome = processor(handler.clone(), &status, "job").process(JobParams::new()).await;

        assert_eq!(outcome, ProcessOutcome::Skipped);
        assert_eq!(handler.executed(), 0);
        let doc = status.get_status(JobType::Summarization, "job").await.unwrap().unwrap();
        assert_eq!(Value::Object(doc), json!({ "status": "error", "error": "Inference" }));
    }

    #[tokio::test]
    async fn test_heartbeat_keeps_short_lease_alive() {
        let (store, status) = setup();
        let mut handler = ScriptedHandler::succeeding(JobPayload::new());
        handler.delay = Duration::from_millis(250);
        let job = JobProcessor::new(
            JobType::Summarization,
            RequestId::from("job"),
            Arc::new(handler),
            status.clone(),
            LeaseSettings::new("worker-1", Duration::from_millis(90)),
        );

        let running = tokio::spawn(async move { job.process(JobParams::new()).await });
        tokio::time::sleep(Duration::from_millis(180)).await;
        assert!(store.lease_exists(JobType::Summarization, "job").await.unwrap());

        running.await.unwrap();
        assert!(!store.lease_exists(JobType::Summarization, "job").await.unwrap());
    }
}
