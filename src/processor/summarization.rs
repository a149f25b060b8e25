// Summarization handler

use async_trait::async_trait;
use std::sync::Arc;

use super::JobHandler;
use crate::executor::Summarizer;
use crate::models::{decode_params, JobParams, JobPayload, SummarizationParams};
use crate::types::{ExecutionError, ValidationError};

pub const MIN_STRENGTH: i64 = 1;
pub const MAX_STRENGTH: i64 = 5;

/// Maximum summary length per strength; 1 is the most concise.
pub fn summary_max_length(strength: i64) -> u32 {
    match strength {
        1 => 100,
        2 => 150,
        4 => 300,
        5 => 400,
        _ => 200,
    }
}

/// Validated summarization input.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRequest {
    pub text: String,
    pub max_length: u32,
}

pub struct SummarizationHandler {
    summarizer: Arc<dyn Summarizer>,
}

impl SummarizationHandler {
    pub fn new(summarizer: Arc<dyn Summarizer>) -> Self {
        Self { summarizer }
    }
}

#[async_trait]
impl JobHandler for SummarizationHandler {
    type Input = SummaryRequest;

    async fn validate(&self, params: &JobParams) -> Result<SummaryRequest, ValidationError> {
        let input: SummarizationParams = decode_params(params)?;

        if input.text.trim().is_empty() {
            return Err(ValidationError::EmptyText);
        }
        if !(MIN_STRENGTH..=MAX_STRENGTH).contains(&input.strength) {
            return Err(ValidationError::StrengthOutOfRange(input.strength));
        }

        Ok(SummaryRequest {
            max_length: summary_max_length(input.strength),
            text: input.text,
        })
    }

    async fn execute(&self, input: SummaryRequest) -> Result<JobPayload, ExecutionError> {
        let mut raw = self.summarizer.summarize(&input.text, input.max_length).await?;

        let summary = raw
            .remove("summary")
            .ok_or_else(|| ExecutionError::MalformedResult("missing `summary` field".to_string()))?;

        let mut result = JobPayload::new();
        result.insert("summary".to_string(), summary);
        if let Some(stats) = raw.remove("stats") {
            result.insert("stats".to_string(), stats);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    struct StubSummarizer {
        reply: Value,
        seen: Mutex<Option<(String, u32)>>,
    }

    impl StubSummarizer {
        fn replying(reply: Value) -> Arc<Self> {
            Arc::new(Self {
                reply,
                seen: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl Summarizer for StubSummarizer {
        async fn summarize(&self, text: &str, max_length: u32) -> Result<JobPayload, ExecutionError> {
            *self.seen.lock().unwrap() = Some((text.to_string(), max_length));
            Ok(self.reply.as_object().cloned().unwrap_or_default())
        }
    }

    fn params(value: Value) -> JobParams {
        value.as_object().cloned().unwrap()
    }

    fn handler() -> SummarizationHandler {
        SummarizationHandler::new(StubSummarizer::replying(json!({ "summary": "x" })))
    }

    #[tokio::test]
    async fn test_validate_input_valid() {
        let input = handler()
            .validate(&params(json!({ "text": "long text", "strength": 1 })))
            .await
            .unwrap();
        assert_eq!(input.max_length, 100);
    }

    #[tokio::test]
    async fn test_validate_input_empty_text() {
        let err = handler()
            .validate(&params(json!({ "text": "   ", "strength": 3 })))
            .await
            .unwrap_err();
        assert_eq!(err.class_name(), "EmptyText");
    }

    #[tokio::test]
    async fn test_validate_input_invalid_text() {
        let err = handler()
            .validate(&params(json!({ "text": 123, "strength": 3 })))
            .await
            .unwrap_err();
        assert_eq!(err.class_name(), "InvalidParameters");
    }

    #[tokio::test]
    async fn test_validate_input_invalid_strength() {
        for strength in [0, 6, -1] {
            let err = handler()
                .validate(&params(json!({ "text": "hello", "strength": strength })))
                .await
                .unwrap_err();
            assert_eq!(err.class_name(), "StrengthOutOfRange");
        }
    }

    #[test]
    fn test_strength_maps_to_max_length() {
        let lengths: Vec<u32> = (1..=5).map(summary_max_length).collect();
        assert_eq!(lengths, vec![100, 150, 200, 300, 400]);
    }

    #[tokio::test]
    async fn test_execute() {
        let stub = StubSummarizer::replying(json!({
            "summary": "short",
            "stats": { "original_length": 9 },
            "model": "bart"
        }));
        let handler = SummarizationHandler::new(stub.clone());

        let result = handler
            .execute(SummaryRequest {
                text: "long text".into(),
                max_length: 300,
            })
            .await
            .unwrap();

        assert_eq!(
            Value::Object(result),
            json!({ "summary": "short", "stats": { "original_length": 9 } })
        );
        assert_eq!(*stub.seen.lock().unwrap(), Some(("long text".to_string(), 300)));
    }

    #[tokio::test]
    async fn test_execute_without_summary_is_malformed() {
        let handler = SummarizationHandler::new(StubSummarizer::replying(json!({ "stats": {} })));

        let err = handler
            .execute(SummaryRequest {
                text: "t".into(),
                max_length: 100,
            })
            .await
            .unwrap_err();
        assert_eq!(err.class_name(), "MalformedResult");
    }
}
