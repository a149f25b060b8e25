// In-process FIFO queue
// Entries are kept encoded so decode failures surface exactly as with Redis.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{JobQueue, QueuedJob};
use crate::types::QueueError;

#[derive(Clone, Default)]
pub struct MemoryJobQueue {
    items: Arc<Mutex<VecDeque<String>>>,
    ready: Arc<Notify>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_raw(&self, raw: &str) {
        self.items.lock().await.push_back(raw.to_string());
        self.ready.notify_one();
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn push(&self, job: QueuedJob) -> Result<(), QueueError> {
        let raw = job.encode()?;
        self.push_raw(&raw).await;
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<QueuedJob>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(raw) = self.items.lock().await.pop_front() {
                return QueuedJob::decode(&raw).map(Some);
            }
            if tokio::time::timeout_at(deadline, self.ready.notified()).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.items.lock().await.len())
    }
}
