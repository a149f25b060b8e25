//! Job queue and worker loop
//!
//! - [`JobQueue`]: push / blocking pull of [`QueuedJob`] envelopes
//! - [`RedisJobQueue`]: Redis list (`LPUSH` in, `BRPOP` out), shared by every worker process
//! - [`MemoryJobQueue`]: in-process queue for tests and single-process runs
//! - [`Worker`]: pulls one job at a time and runs its processor synchronously
//!
//! Delivery guarantees belong to the backend. A popped job that is never
//! processed (worker crash) is not redelivered; its record stays WORKING until
//! the scheduler's abandoned-work sweep finds it without a lease.

pub mod jobs;
pub mod memory;
pub mod redis_queue;
pub mod workers;

pub use jobs::QueuedJob;
pub use memory::MemoryJobQueue;
pub use redis_queue::RedisJobQueue;
pub use workers::Worker;

use async_trait::async_trait;
use std::time::Duration;

use crate::types::QueueError;

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn push(&self, job: QueuedJob) -> Result<(), QueueError>;

    /// Wait up to `timeout` for the next job. `Ok(None)` on timeout.
    async fn pop(&self, timeout: Duration) -> Result<Option<QueuedJob>, QueueError>;

    async fn len(&self) -> Result<usize, QueueError>;
}
