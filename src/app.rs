// Composition root: wires handlers, executors, store and queue into a registry.

use std::sync::Arc;

use crate::executor::{Summarizer, Transcriber};
use crate::processor::{LeaseSettings, SummarizationHandler, TranscriptionHandler};
use crate::queue::JobQueue;
use crate::registry::JobRegistry;
use crate::status::StatusManager;
use crate::types::JobType;

pub fn build_registry(
    status: StatusManager,
    queue: Arc<dyn JobQueue>,
    transcriber: Arc<dyn Transcriber>,
    summarizer: Arc<dyn Summarizer>,
    lease: LeaseSettings,
) -> JobRegistry {
    let mut registry = JobRegistry::new(status, queue);
    registry.register_handler(
        JobType::Transcription,
        Arc::new(TranscriptionHandler::new(transcriber)),
        lease.clone(),
    );
    registry.register_handler(
        JobType::Summarization,
        Arc::new(SummarizationHandler::new(summarizer)),
        lease,
    );
    registry
}
