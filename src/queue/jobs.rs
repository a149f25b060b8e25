// Queue envelope for a dispatched job

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::JobParams;
use crate::types::{JobType, QueueError, RequestId};

/// What crosses the queue: enough to rebuild the processor on the worker side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub job_type: JobType,
    pub request_id: RequestId,
    pub params: JobParams,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedJob {
    pub fn new(job_type: JobType, request_id: RequestId, params: JobParams) -> Self {
        Self {
            job_type,
            request_id,
            params,
            enqueued_at: Utc::now(),
        }
    }

    pub fn encode(&self) -> Result<String, QueueError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self, QueueError> {
        serde_json::from_str(raw).map_err(|e| QueueError::Malformed(e.to_string()))
    }
}
