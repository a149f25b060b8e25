use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};

use scribe_jobs::{
    app::build_registry,
    config::Config,
    executor::HttpInference,
    processor::LeaseSettings,
    queue::{RedisJobQueue, Worker},
    scheduler::CleanupScheduler,
    status::StatusManager,
    store::RedisStatusStore,
    types::JobType,
    utils::{init_logger, install_shutdown_handler, worker_identity},
};

#[derive(Parser)]
#[command(name = "scribe-jobs", version, about = "Job workers and cleanup scheduler for Scribe")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pull queued jobs and process them one at a time
    Worker,
    /// Run the periodic cleanup tasks
    Scheduler,
    /// Print the stored status document of a job
    Status {
        job_type: JobType,
        request_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let prefix = match cli.command {
        Command::Worker => "worker",
        Command::Scheduler => "scheduler",
        Command::Status { .. } => "status",
    };
    let _log_guard = init_logger(&config.log, prefix);

    match cli.command {
        Command::Worker => run_worker(config).await,
        Command::Scheduler => run_scheduler(config).await,
        Command::Status { job_type, request_id } => print_status(config, job_type, &request_id).await,
    }
}

async fn connect_store(config: &Config) -> RedisStatusStore {
    match RedisStatusStore::connect(&config.redis.url).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Cannot connect to status store");
            std::process::exit(1);
        }
    }
}

async fn run_worker(config: Config) -> anyhow::Result<()> {
    let store = Arc::new(connect_store(&config).await);
    let queue = Arc::new(RedisJobQueue::from_manager(store.connection(), &config.queue.name));
    let inference = Arc::new(HttpInference::new(&config.inference.url, config.inference.timeout)?);

    let worker_id = worker_identity();
    let registry = build_registry(
        StatusManager::new(store),
        queue.clone(),
        inference.clone(),
        inference,
        LeaseSettings::new(worker_id.clone(), config.worker.lease_ttl),
    );

    let worker = Worker::new(worker_id, Arc::new(registry), queue, config.queue.poll_timeout);
    info!(worker = worker.id(), queue = %config.queue.name, "Worker listening");

    let stats = worker.run(install_shutdown_handler()).await;
    info!(?stats, "Worker exited");
    Ok(())
}

async fn run_scheduler(config: Config) -> anyhow::Result<()> {
    let store = Arc::new(connect_store(&config).await);
    let scheduler = Arc::new(CleanupScheduler::new(
        store,
        config.uploads.dir.clone(),
        config.scheduler.sweep_interval,
    ));

    if let Err(e) = scheduler.run(install_shutdown_handler()).await {
        error!(error = %e, "Scheduler error");
        std::process::exit(1);
    }
    Ok(())
}

async fn print_status(config: Config, job_type: JobType, request_id: &str) -> anyhow::Result<()> {
    let store = Arc::new(connect_store(&config).await);
    let status = StatusManager::new(store);

    match status.get_status(job_type, request_id).await? {
        Some(document) => println!("{}", serde_json::to_string_pretty(&document)?),
        None => println!("not found"),
    }
    Ok(())
}
