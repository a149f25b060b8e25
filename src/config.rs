use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub redis: RedisConfig,
    pub uploads: UploadConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub scheduler: SchedulerConfig,
    pub inference: InferenceConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub name: String,
    pub poll_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub lease_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub sweep_interval: chrono::Duration,
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub filter: String,
    pub dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let secs = |key: &str, default: &str| -> Result<Duration> {
            let raw = var(key, default);
            let value: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number of seconds, got {:?}", key, raw))?;
            Ok(Duration::from_secs(value))
        };

        let redis_url = match lookup("REDIS_URL") {
            Some(url) => url,
            None => {
                let host = var("REDIS_HOST", "localhost");
                let port: u16 = var("REDIS_PORT", "6379")
                    .parse()
                    .context("REDIS_PORT must be a port number")?;
                let db: u32 = var("REDIS_DB", "0")
                    .parse()
                    .context("REDIS_DB must be a database index")?;
                format!("redis://{}:{}/{}", host, port, db)
            }
        };

        let sweep_interval = secs("LEASE_SWEEP_INTERVAL_SECS", "600")?;
        if sweep_interval.is_zero() {
            bail!("LEASE_SWEEP_INTERVAL_SECS must be greater than zero");
        }
        let sweep_interval = chrono::Duration::from_std(sweep_interval)
            .context("LEASE_SWEEP_INTERVAL_SECS is out of range")?;

        Ok(Self {
            redis: RedisConfig { url: redis_url },
            uploads: UploadConfig {
                dir: PathBuf::from(var("GESHI_UPLOAD_DIR", "tmp/uploads")),
            },
            queue: QueueConfig {
                name: var("SCRIBE_QUEUE", "default"),
                poll_timeout: secs("WORKER_POLL_TIMEOUT_SECS", "5")?,
            },
            worker: WorkerConfig {
                lease_ttl: secs("JOB_LEASE_SECS", "300")?,
            },
            scheduler: SchedulerConfig {
                sweep_interval,
            },
            inference: InferenceConfig {
                url: var("INFERENCE_URL", "http://localhost:8000"),
                timeout: secs("INFERENCE_TIMEOUT_SECS", "3600")?,
            },
            log: LogConfig {
                filter: var("RUST_LOG", "scribe_jobs=info"),
                dir: lookup("LOG_DIR").map(PathBuf::from),
            },
        })
    }
}
