//! Status Store
//!
//! Key-value persistence for job status documents. One JSON object per job at
//! `"{job_type}:{request_id}"`; every write resets the TTL to [`STATUS_TTL_SECS`].
//!
//! - [`RedisStatusStore`]: production backend
//! - [`MemoryStatusStore`]: in-process backend with the same semantics, used by tests
//!   and single-process runs
//!
//! Reads are fail-open: a document that cannot be decoded as a JSON object is
//! reported as absent, never as a distinct error.
//!
//! Besides documents the store carries per-record worker leases
//! (`lease:{job_type}:{request_id}`) and the scheduler's recurring task book.

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStatusStore;
pub use redis_store::RedisStatusStore;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::models::{StatusDocument, ERROR_FIELD, EXPIRES_AT_FIELD, STATUS_FIELD};
use crate::types::{JobStatus, JobType, StoreError};

/// Fixed record lifetime, reset on every write.
pub const STATUS_TTL_SECS: u64 = 60 * 60 * 24;

pub fn status_key(job_type: JobType, id: &str) -> String {
    format!("{}:{}", job_type, id)
}

pub fn lease_key(job_type: JobType, id: &str) -> String {
    format!("lease:{}:{}", job_type, id)
}

#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Overwrite the document with `data` plus the injected `status`.
    async fn put(
        &self,
        job_type: JobType,
        id: &str,
        status: JobStatus,
        data: StatusDocument,
    ) -> Result<(), StoreError>;

    /// `Ok(None)` for a missing key and for any undecodable value.
    async fn get(&self, job_type: JobType, id: &str) -> Result<Option<StatusDocument>, StoreError>;

    /// Replace only `status`, keeping the other fields of the current snapshot
    /// (or starting from an empty one). Refreshes the TTL. `expires_at` only
    /// survives on a DONE record, so any other status drops it.
    async fn update(&self, job_type: JobType, id: &str, status: JobStatus) -> Result<(), StoreError>;

    async fn exists(&self, job_type: JobType, id: &str) -> Result<bool, StoreError>;

    /// Request ids that currently have a status document for `job_type`.
    async fn list_ids(&self, job_type: JobType) -> Result<Vec<String>, StoreError>;

    /// Set-if-absent with expiry. `true` when `owner` now holds the lease.
    async fn acquire_lease(
        &self,
        job_type: JobType,
        id: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Extend the lease if `owner` still holds it.
    async fn renew_lease(
        &self,
        job_type: JobType,
        id: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Drop the lease if `owner` still holds it.
    async fn release_lease(&self, job_type: JobType, id: &str, owner: &str) -> Result<(), StoreError>;

    async fn lease_exists(&self, job_type: JobType, id: &str) -> Result<bool, StoreError>;

    /// In one step: if the record is WORKING and nobody holds its lease,
    /// overwrite it with `{status: error, error: class_name}`. `true` when it did.
    async fn reclaim_if_abandoned(
        &self,
        job_type: JobType,
        id: &str,
        class_name: &str,
    ) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Recurring task registrations kept alongside the status documents so a
/// restarted scheduler can clear what a previous instance registered.
#[async_trait]
pub trait TaskBook: Send + Sync {
    async fn registered_tasks(&self) -> Result<Vec<String>, StoreError>;

    /// Remove every registration, returning how many there were.
    async fn clear_tasks(&self) -> Result<usize, StoreError>;

    async fn register_task(&self, id: &str, schedule: &str) -> Result<(), StoreError>;
}

pub(crate) fn inject_status(mut data: StatusDocument, status: JobStatus) -> StatusDocument {
    data.insert(STATUS_FIELD.to_string(), Value::String(status.to_string()));
    data
}

/// Status change on an existing snapshot, as `update` applies it.
pub(crate) fn transition(mut data: StatusDocument, status: JobStatus) -> StatusDocument {
    if status != JobStatus::Done {
        data.remove(EXPIRES_AT_FIELD);
    }
    inject_status(data, status)
}

pub(crate) fn error_document(class_name: &str) -> StatusDocument {
    let mut data = StatusDocument::new();
    data.insert(ERROR_FIELD.to_string(), Value::String(class_name.to_string()));
    data
}

pub(crate) fn is_abandoned(doc: Option<&StatusDocument>) -> bool {
    doc.and_then(|d| d.get(STATUS_FIELD))
        .and_then(Value::as_str)
        .map(|s| s == JobStatus::Working.as_str())
        .unwrap_or(false)
}

pub(crate) fn decode_document(key: &str, raw: &str) -> Option<StatusDocument> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => {
            tracing::warn!(key, "Stored status is not a JSON object, treating as not found");
            None
        }
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to decode stored status, treating as not found");
            None
        }
    }
}
