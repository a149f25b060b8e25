use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::debug;

use super::{JobQueue, QueuedJob};
use crate::types::QueueError;

pub fn queue_key(name: &str) -> String {
    format!("scribe:queue:{}", name)
}

#[derive(Clone)]
pub struct RedisJobQueue {
    conn: ConnectionManager,
    key: String,
}

impl RedisJobQueue {
    pub async fn connect(url: &str, name: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::from_manager(conn, name))
    }

    pub fn from_manager(conn: ConnectionManager, name: &str) -> Self {
        Self {
            conn,
            key: queue_key(name),
        }
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn push(&self, job: QueuedJob) -> Result<(), QueueError> {
        let payload = job.encode()?;
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(&self.key, payload).await?;
        debug!(queue = %self.key, job_type = %job.job_type, request_id = %job.request_id, "Job pushed");
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<QueuedJob>, QueueError> {
        // BRPOP treats 0 as "block forever".
        let seconds = timeout.as_secs_f64().max(0.01);
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = conn.brpop(&self.key, seconds).await?;
        match popped {
            Some((_, raw)) => QueuedJob::decode(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn len(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(&self.key).await?;
        Ok(len)
    }
}
