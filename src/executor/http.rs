// HTTP inference client
// Forwards transcription and summarization calls to a model-serving endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{Summarizer, Transcriber};
use crate::models::JobPayload;
use crate::types::ExecutionError;

pub struct HttpInference {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct TranscribeRequest<'a> {
    file_path: &'a str,
    language: &'a str,
    model: &'a str,
}

#[derive(Serialize)]
struct SummarizeRequest<'a> {
    text: &'a str,
    max_length: u32,
}

impl HttpInference {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ExecutionError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<JobPayload, ExecutionError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "Calling inference endpoint");

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ExecutionError::Inference(format!("{}: {}", status, detail)));
        }

        match response.json::<Value>().await {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(ExecutionError::MalformedResult(format!(
                "expected a JSON object, got {}",
                other
            ))),
            Err(e) => Err(ExecutionError::MalformedResult(e.to_string())),
        }
    }
}

#[async_trait]
impl Transcriber for HttpInference {
    async fn transcribe(
        &self,
        file_path: &str,
        language: &str,
        model: &str,
    ) -> Result<JobPayload, ExecutionError> {
        self.post(
            "/transcribe",
            &TranscribeRequest {
                file_path,
                language,
                model,
            },
        )
        .await
    }
}

#[async_trait]
impl Summarizer for HttpInference {
    async fn summarize(&self, text: &str, max_length: u32) -> Result<JobPayload, ExecutionError> {
        self.post("/summarize", &SummarizeRequest { text, max_length }).await
    }
}
