// In-process status store
//
// Mirrors the Redis backend: values are held as raw strings with an expiry
// instant, so decode and TTL behaviour match what the Redis store does.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::{
    decode_document, error_document, inject_status, is_abandoned, lease_key, status_key, transition, StatusStore,
    TaskBook, STATUS_TTL_SECS,
};
use crate::models::StatusDocument;
use crate::types::{JobStatus, JobType, StoreError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    tasks: BTreeMap<String, String>,
}

impl State {
    fn live(&self, key: &str) -> Option<&Entry> {
        let now = Instant::now();
        self.entries.get(key).filter(|e| e.is_live(now))
    }
}

#[derive(Clone)]
pub struct MemoryStatusStore {
    inner: Arc<RwLock<State>>,
    ttl: Duration,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(STATUS_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(State::default())),
            ttl,
        }
    }

    /// Write a raw value under `key`, bypassing encoding.
    pub async fn insert_raw(&self, key: &str, value: &str) {
        let mut guard = self.inner.write().await;
        guard
            .entries
            .insert(key.to_string(), Entry::new(value.to_string(), self.ttl));
    }

    /// Remaining lifetime of a live key.
    pub async fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let guard = self.inner.read().await;
        guard
            .live(key)
            .map(|e| e.expires_at.saturating_duration_since(Instant::now()))
    }

    /// Number of live keys, leases included.
    pub async fn key_count(&self) -> usize {
        let guard = self.inner.read().await;
        let now = Instant::now();
        guard.entries.values().filter(|e| e.is_live(now)).count()
    }
}

impl Default for MemoryStatusStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn put(
        &self,
        job_type: JobType,
        id: &str,
        status: JobStatus,
        data: StatusDocument,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_string(&inject_status(data, status))?;
        let mut guard = self.inner.write().await;
        guard
            .entries
            .insert(status_key(job_type, id), Entry::new(value, self.ttl));
        Ok(())
    }

    async fn get(&self, job_type: JobType, id: &str) -> Result<Option<StatusDocument>, StoreError> {
        let key = status_key(job_type, id);
        let guard = self.inner.read().await;
        Ok(guard.live(&key).and_then(|e| decode_document(&key, &e.value)))
    }

    async fn update(&self, job_type: JobType, id: &str, status: JobStatus) -> Result<(), StoreError> {
        let key = status_key(job_type, id);
        // Held across the read and the write, like the server-side script.
        let mut guard = self.inner.write().await;
        let current = guard
            .live(&key)
            .and_then(|e| decode_document(&key, &e.value))
            .unwrap_or_default();
        let value = serde_json::to_string(&transition(current, status))?;
        guard.entries.insert(key, Entry::new(value, self.ttl));
        Ok(())
    }

    async fn exists(&self, job_type: JobType, id: &str) -> Result<bool, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.live(&status_key(job_type, id)).is_some())
    }

    async fn list_ids(&self, job_type: JobType) -> Result<Vec<String>, StoreError> {
        let prefix = format!("{}:", job_type);
        let guard = self.inner.read().await;
        let now = Instant::now();
        let mut ids: Vec<String> = guard
            .entries
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .filter_map(|(k, _)| k.strip_prefix(&prefix).map(str::to_string))
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn acquire_lease(
        &self,
        job_type: JobType,
        id: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let key = lease_key(job_type, id);
        let mut guard = self.inner.write().await;
        if guard.live(&key).is_some() {
            return Ok(false);
        }
        guard.entries.insert(key, Entry::new(owner.to_string(), ttl));
        Ok(true)
    }

    async fn renew_lease(
        &self,
        job_type: JobType,
        id: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let key = lease_key(job_type, id);
        let mut guard = self.inner.write().await;
        let held = guard.live(&key).map(|e| e.value == owner).unwrap_or(false);
        if held {
            guard.entries.insert(key, Entry::new(owner.to_string(), ttl));
        }
        Ok(held)
    }

    async fn release_lease(&self, job_type: JobType, id: &str, owner: &str) -> Result<(), StoreError> {
        let key = lease_key(job_type, id);
        let mut guard = self.inner.write().await;
        if guard.entries.get(&key).map(|e| e.value == owner).unwrap_or(false) {
            guard.entries.remove(&key);
        }
        Ok(())
    }

    async fn lease_exists(&self, job_type: JobType, id: &str) -> Result<bool, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.live(&lease_key(job_type, id)).is_some())
    }

    async fn reclaim_if_abandoned(
        &self,
        job_type: JobType,
        id: &str,
        class_name: &str,
    ) -> Result<bool, StoreError> {
        let key = status_key(job_type, id);
        let mut guard = self.inner.write().await;
        let current = guard.live(&key).and_then(|e| decode_document(&key, &e.value));
        if !is_abandoned(current.as_ref()) || guard.live(&lease_key(job_type, id)).is_some() {
            return Ok(false);
        }
        let value = serde_json::to_string(&inject_status(error_document(class_name), JobStatus::Error))?;
        guard.entries.insert(key, Entry::new(value, self.ttl));
        Ok(true)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl TaskBook for MemoryStatusStore {
    async fn registered_tasks(&self) -> Result<Vec<String>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.tasks.keys().cloned().collect())
    }

    async fn clear_tasks(&self) -> Result<usize, StoreError> {
        let mut guard = self.inner.write().await;
        let count = guard.tasks.len();
        guard.tasks.clear();
        Ok(count)
    }

    async fn register_task(&self, id: &str, schedule: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.tasks.insert(id.to_string(), schedule.to_string());
        Ok(())
    }
}
