use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{JobStatus, JobType, RequestId, ValidationError};

/// Flat JSON object persisted per job: `status` plus job-specific fields.
pub type StatusDocument = Map<String, Value>;

/// Job-type-specific result fields returned by an executor.
pub type JobPayload = Map<String, Value>;

/// Flat keyword parameters supplied by the intake layer.
pub type JobParams = Map<String, Value>;

pub const STATUS_FIELD: &str = "status";
pub const ERROR_FIELD: &str = "error";
pub const EXPIRES_AT_FIELD: &str = "expires_at";

/// Typed view over a stored status document.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub job_type: JobType,
    pub request_id: RequestId,
    pub status: JobStatus,
    pub payload: JobPayload,
    pub error: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Returns `None` when the document has no readable `status` field.
    pub fn from_document(
        job_type: JobType,
        request_id: RequestId,
        mut document: StatusDocument,
    ) -> Option<Self> {
        let status = document
            .remove(STATUS_FIELD)?
            .as_str()?
            .parse::<JobStatus>()
            .ok()?;

        let error = match document.remove(ERROR_FIELD) {
            Some(Value::String(class)) => Some(class),
            _ => None,
        };

        let expires_at = document
            .remove(EXPIRES_AT_FIELD)
            .and_then(|v| v.as_str().map(str::to_string))
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Some(Self {
            job_type,
            request_id,
            status,
            payload: document,
            error,
            expires_at,
        })
    }

    pub fn into_document(self) -> StatusDocument {
        let mut document = self.payload;
        if let Some(error) = self.error {
            document.insert(ERROR_FIELD.to_string(), Value::String(error));
        }
        if let Some(expires_at) = self.expires_at {
            document.insert(EXPIRES_AT_FIELD.to_string(), Value::String(format_timestamp(expires_at)));
        }
        document.insert(STATUS_FIELD.to_string(), Value::String(self.status.to_string()));
        document
    }
}

/// ISO-8601 UTC with microseconds and a `Z` suffix.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

// Job parameters

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionParams {
    pub file_path: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_language() -> String {
    "ja".to_string()
}

fn default_model() -> String {
    "base".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizationParams {
    pub text: String,
    pub strength: i64,
}

/// Decode flat keyword parameters into a handler's typed input.
pub fn decode_params<T: serde::de::DeserializeOwned>(params: &JobParams) -> Result<T, ValidationError> {
    serde_json::from_value(Value::Object(params.clone()))
        .map_err(|e| ValidationError::InvalidParameters(e.to_string()))
}

/// Encode typed parameters as the flat object pushed through the queue.
pub fn encode_params<T: Serialize>(params: &T) -> JobParams {
    match serde_json::to_value(params) {
        Ok(Value::Object(map)) => map,
        _ => JobParams::new(),
    }
}
