// Inference executor seam
//
// The model routines are opaque: primitives in, a flat result mapping out.

pub mod http;

pub use http::HttpInference;

use async_trait::async_trait;

use crate::models::JobPayload;
use crate::types::ExecutionError;

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Expected result fields: `text`, and optionally `segments` and `stats`.
    async fn transcribe(
        &self,
        file_path: &str,
        language: &str,
        model: &str,
    ) -> Result<JobPayload, ExecutionError>;
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Expected result fields: `summary`, and optionally `stats`.
    async fn summarize(&self, text: &str, max_length: u32) -> Result<JobPayload, ExecutionError>;
}
