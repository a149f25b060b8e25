// Scribe Jobs - lifecycle and status tracking for asynchronous transcription and summarization work

pub mod app;
pub mod config;
pub mod executor;
pub mod models;
pub mod processor;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use processor::{JobHandler, JobProcessor, LeaseSettings, Process, ProcessOutcome};
pub use registry::JobRegistry;
pub use status::StatusManager;
pub use types::{JobStatus, JobType, RequestId};
