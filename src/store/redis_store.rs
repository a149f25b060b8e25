// Redis-backed status store

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::time::Duration;
use tracing::{debug, info};

use super::{decode_document, inject_status, lease_key, status_key, StatusStore, TaskBook, STATUS_TTL_SECS};
use crate::models::StatusDocument;
use crate::types::{JobStatus, JobType, StoreError};

const TASKS_KEY: &str = "scheduler:tasks";
const SCAN_BATCH: usize = 200;

// GET, decode-or-empty, inject status, SET EX: one round trip, no interleaving.
const UPDATE_STATUS_SCRIPT: &str = r#"
local doc = {}
local current = redis.call('GET', KEYS[1])
if current then
    local ok, decoded = pcall(cjson.decode, current)
    if ok and type(decoded) == 'table' and decoded[1] == nil then
        doc = decoded
    end
end
if ARGV[1] ~= 'done' then
    doc['expires_at'] = nil
end
doc['status'] = ARGV[1]
redis.call('SET', KEYS[1], cjson.encode(doc), 'EX', tonumber(ARGV[2]))
return 1
"#;

// KEYS[1] status, KEYS[2] lease. Only a WORKING record with no lease is replaced.
const RECLAIM_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    return 0
end
local ok, doc = pcall(cjson.decode, current)
if not ok or type(doc) ~= 'table' or doc['status'] ~= 'working' then
    return 0
end
if redis.call('EXISTS', KEYS[2]) == 1 then
    return 0
end
redis.call('SET', KEYS[1], cjson.encode({ status = 'error', error = ARGV[1] }), 'EX', tonumber(ARGV[2]))
return 1
"#;

const RENEW_LEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('PEXPIRE', KEYS[1], tonumber(ARGV[2]))
    return 1
end
return 0
"#;

const RELEASE_LEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

#[derive(Clone)]
pub struct RedisStatusStore {
    conn: ConnectionManager,
    ttl_secs: u64,
}

impl RedisStatusStore {
    /// Connect and verify the server answers. Callers treat failure as fatal.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        let store = Self::from_manager(conn);
        store.ping().await?;
        info!("Connected to status store");
        Ok(store)
    }

    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self {
            conn,
            ttl_secs: STATUS_TTL_SECS,
        }
    }

    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

fn lease_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl StatusStore for RedisStatusStore {
    async fn put(
        &self,
        job_type: JobType,
        id: &str,
        status: JobStatus,
        data: StatusDocument,
    ) -> Result<(), StoreError> {
        let key = status_key(job_type, id);
        let value = serde_json::to_string(&inject_status(data, status))?;
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(&key, value, self.ttl_secs).await?;
        debug!(key, %status, "Status written");
        Ok(())
    }

    async fn get(&self, job_type: JobType, id: &str) -> Result<Option<StatusDocument>, StoreError> {
        let key = status_key(job_type, id);
        let mut conn = self.conn.clone();
        let raw: Option<Vec<u8>> = conn.get(&key).await?;
        Ok(raw.and_then(|bytes| match String::from_utf8(bytes) {
            Ok(text) => decode_document(&key, &text),
            Err(_) => {
                tracing::warn!(key, "Stored status is not UTF-8, treating as not found");
                None
            }
        }))
    }

    async fn update(&self, job_type: JobType, id: &str, status: JobStatus) -> Result<(), StoreError> {
        let key = status_key(job_type, id);
        let mut conn = self.conn.clone();
        let _: i64 = Script::new(UPDATE_STATUS_SCRIPT)
            .key(&key)
            .arg(status.as_str())
            .arg(self.ttl_secs)
            .invoke_async(&mut conn)
            .await?;
        debug!(key, %status, "Status updated");
        Ok(())
    }

    async fn exists(&self, job_type: JobType, id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let found: bool = conn.exists(status_key(job_type, id)).await?;
        Ok(found)
    }

    async fn list_ids(&self, job_type: JobType) -> Result<Vec<String>, StoreError> {
        let prefix = format!("{}:", job_type);
        let pattern = format!("{}*", prefix);
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut ids = Vec::new();

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            ids.extend(
                keys.iter()
                    .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string)),
            );
            if next == 0 {
                break;
            }
            cursor = next;
        }

        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn acquire_lease(
        &self,
        job_type: JobType,
        id: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(lease_key(job_type, id))
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(lease_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn renew_lease(
        &self,
        job_type: JobType,
        id: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let renewed: i64 = Script::new(RENEW_LEASE_SCRIPT)
            .key(lease_key(job_type, id))
            .arg(owner)
            .arg(lease_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(renewed == 1)
    }

    async fn release_lease(&self, job_type: JobType, id: &str, owner: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = Script::new(RELEASE_LEASE_SCRIPT)
            .key(lease_key(job_type, id))
            .arg(owner)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn lease_exists(&self, job_type: JobType, id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let found: bool = conn.exists(lease_key(job_type, id)).await?;
        Ok(found)
    }

    async fn reclaim_if_abandoned(
        &self,
        job_type: JobType,
        id: &str,
        class_name: &str,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reclaimed: i64 = Script::new(RECLAIM_SCRIPT)
            .key(status_key(job_type, id))
            .key(lease_key(job_type, id))
            .arg(class_name)
            .arg(self.ttl_secs)
            .invoke_async(&mut conn)
            .await?;
        Ok(reclaimed == 1)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskBook for RedisStatusStore {
    async fn registered_tasks(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let mut ids: Vec<String> = conn.hkeys(TASKS_KEY).await?;
        ids.sort();
        Ok(ids)
    }

    async fn clear_tasks(&self) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        let count: usize = conn.hlen(TASKS_KEY).await?;
        let _: () = conn.del(TASKS_KEY).await?;
        Ok(count)
    }

    async fn register_task(&self, id: &str, schedule: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(TASKS_KEY, id, schedule).await?;
        Ok(())
    }
}
