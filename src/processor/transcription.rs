// Transcription handler

use async_trait::async_trait;
use std::sync::Arc;

use super::JobHandler;
use crate::executor::Transcriber;
use crate::models::{decode_params, JobParams, JobPayload, TranscriptionParams};
use crate::types::{ExecutionError, ValidationError};

pub const SUPPORTED_LANGUAGES: &[&str] = &["ja", "en"];

const RESULT_FIELDS: &[&str] = &["segments", "stats"];

pub struct TranscriptionHandler {
    transcriber: Arc<dyn Transcriber>,
}

impl TranscriptionHandler {
    pub fn new(transcriber: Arc<dyn Transcriber>) -> Self {
        Self { transcriber }
    }
}

#[async_trait]
impl JobHandler for TranscriptionHandler {
    type Input = TranscriptionParams;

    async fn validate(&self, params: &JobParams) -> Result<TranscriptionParams, ValidationError> {
        let input: TranscriptionParams = decode_params(params)?;

        // An unreadable path (permissions, broken mount) counts as missing.
        let exists = tokio::fs::try_exists(&input.file_path).await.unwrap_or(false);
        if !exists {
            return Err(ValidationError::FileNotFound {
                path: input.file_path,
            });
        }

        if !SUPPORTED_LANGUAGES.contains(&input.language.as_str()) {
            return Err(ValidationError::UnsupportedLanguage(input.language));
        }

        Ok(input)
    }

    async fn execute(&self, input: TranscriptionParams) -> Result<JobPayload, ExecutionError> {
        let mut raw = self
            .transcriber
            .transcribe(&input.file_path, &input.language, &input.model)
            .await?;

        let text = raw
            .remove("text")
            .ok_or_else(|| ExecutionError::MalformedResult("missing `text` field".to_string()))?;

        let mut result = JobPayload::new();
        result.insert("text".to_string(), text);
        for field in RESULT_FIELDS {
            if let Some(value) = raw.remove(*field) {
                result.insert(field.to_string(), value);
            }
        }
        Ok(result)
    }
}
