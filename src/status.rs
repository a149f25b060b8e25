//! Status Manager
//!
//! Typed transitions over the [`StatusStore`]. Every write to a job's status
//! document goes through here:
//!
//! ```text
//! PENDING --(worker picks up)--> WORKING --(ok)----> DONE   {result.., expires_at}
//!                                        \--(err)--> ERROR  {error: <class name>}
//! ```

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{format_timestamp, JobPayload, JobRecord, StatusDocument, EXPIRES_AT_FIELD};
use crate::store::{error_document, StatusStore, STATUS_TTL_SECS};
use crate::types::{JobStatus, JobType, RequestId, StoreError};

#[derive(Clone)]
pub struct StatusManager {
    store: Arc<dyn StatusStore>,
}

impl StatusManager {
    pub fn new(store: Arc<dyn StatusStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn StatusStore> {
        self.store.clone()
    }

    pub async fn set_pending(&self, job_type: JobType, id: &str) -> Result<(), StoreError> {
        self.store
            .put(job_type, id, JobStatus::Pending, StatusDocument::new())
            .await
    }

    /// Keeps whatever the record already holds, minus `expires_at`, and refreshes its TTL.
    pub async fn set_working(&self, job_type: JobType, id: &str) -> Result<(), StoreError> {
        self.store.update(job_type, id, JobStatus::Working).await
    }

    /// Persist the result with `status=done` and `expires_at = now + 24h`.
    pub async fn set_done(
        &self,
        job_type: JobType,
        id: &str,
        result: JobPayload,
    ) -> Result<(), StoreError> {
        let expires_at = Utc::now() + chrono::Duration::seconds(STATUS_TTL_SECS as i64);
        let mut data = result;
        data.insert(
            EXPIRES_AT_FIELD.to_string(),
            Value::String(format_timestamp(expires_at)),
        );
        self.store.put(job_type, id, JobStatus::Done, data).await
    }

    /// Overwrites any partial result; only the error class survives.
    pub async fn set_error(&self, job_type: JobType, id: &str, class_name: &str) -> Result<(), StoreError> {
        self.store
            .put(job_type, id, JobStatus::Error, error_document(class_name))
            .await
    }

    /// ERROR with `class_name`, but only for a WORKING record nobody holds a lease on.
    pub async fn reclaim_abandoned(&self, job_type: JobType, id: &str, class_name: &str) -> Result<bool, StoreError> {
        self.store.reclaim_if_abandoned(job_type, id, class_name).await
    }

    pub async fn get_status(
        &self,
        job_type: JobType,
        id: &str,
    ) -> Result<Option<StatusDocument>, StoreError> {
        self.store.get(job_type, id).await
    }

    pub async fn get_record(&self, job_type: JobType, id: &str) -> Result<Option<JobRecord>, StoreError> {
        Ok(self
            .store
            .get(job_type, id)
            .await?
            .and_then(|doc| JobRecord::from_document(job_type, RequestId::from(id), doc)))
    }

    pub async fn list_ids(&self, job_type: JobType) -> Result<Vec<String>, StoreError> {
        self.store.list_ids(job_type).await
    }

    // Leases

    pub async fn acquire_lease(
        &self,
        job_type: JobType,
        id: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.store.acquire_lease(job_type, id, owner, ttl).await
    }

    pub async fn renew_lease(
        &self,
        job_type: JobType,
        id: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.store.renew_lease(job_type, id, owner, ttl).await
    }

    pub async fn release_lease(&self, job_type: JobType, id: &str, owner: &str) -> Result<(), StoreError> {
        self.store.release_lease(job_type, id, owner).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStatusStore;
    use chrono::DateTime;
    use serde_json::json;

    fn manager() -> StatusManager {
        StatusManager::new(Arc::new(MemoryStatusStore::new()))
    }

    #[tokio::test]
    async fn test_set_pending() {
        let status = manager();
        status.set_pending(JobType::Transcription, "a").await.unwrap();

        let doc = status.get_status(JobType::Transcription, "a").await.unwrap().unwrap();
        assert_eq!(Value::Object(doc), json!({ "status": "pending" }));
    }

    #[tokio::test]
    async fn test_set_done_adds_expiry() {
        let status = manager();
        let mut result = JobPayload::new();
        result.insert("summary".into(), json!("x"));

        let before = Utc::now();
        status.set_done(JobType::Summarization, "a", result).await.unwrap();

        let doc = status.get_status(JobType::Summarization, "a").await.unwrap().unwrap();
        assert_eq!(doc["status"], "done");
        assert_eq!(doc["summary"], "x");

        let raw = doc["expires_at"].as_str().unwrap();
        assert!(raw.ends_with('Z'));
        let expires_at = DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc);
        let expected = before + chrono::Duration::seconds(86_400);
        assert!((expires_at - expected).num_seconds().abs() <= 5);
    }

    #[tokio::test]
    async fn test_status_and_expiry_win_over_result_fields() {
        let status = manager();
        let mut result = JobPayload::new();
        result.insert("status".into(), json!("bogus"));
        result.insert("expires_at".into(), json!("never"));
        status.set_done(JobType::Summarization, "a", result).await.unwrap();

        let record = status.get_record(JobType::Summarization, "a").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Done);
        assert!(record.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_set_error_replaces_result() {
        let status = manager();
        let mut partial = JobPayload::new();
        partial.insert("text".into(), json!("half"));
        status.set_done(JobType::Transcription, "a", partial).await.unwrap();

        status.set_error(JobType::Transcription, "a", "Inference").await.unwrap();

        let doc = status.get_status(JobType::Transcription, "a").await.unwrap().unwrap();
        assert_eq!(Value::Object(doc), json!({ "status": "error", "error": "Inference" }));
    }

    #[tokio::test]
    async fn test_working_after_done_clears_expiry() {
        let status = manager();
        let mut result = JobPayload::new();
        result.insert("summary".into(), json!("x"));
        status.set_done(JobType::Summarization, "a", result).await.unwrap();

        status.set_working(JobType::Summarization, "a").await.unwrap();

        let record = status.get_record(JobType::Summarization, "a").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Working);
        assert!(record.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_working_keeps_existing_fields() {
        let status = manager();
        status.set_pending(JobType::Summarization, "a").await.unwrap();
        status.set_working(JobType::Summarization, "a").await.unwrap();

        let record = status.get_record(JobType::Summarization, "a").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Working);
        assert!(record.expires_at.is_none());
    }
}
