// Type definitions, enums and the error taxonomy

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Transcription,
    Summarization,
}

impl JobType {
    pub const ALL: [JobType; 2] = [JobType::Transcription, JobType::Summarization];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Transcription => "transcription",
            JobType::Summarization => "summarization",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown job type: {0}")]
pub struct ParseJobTypeError(pub String);

impl FromStr for JobType {
    type Err = ParseJobTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transcription" => Ok(JobType::Transcription),
            "summarization" => Ok(JobType::Summarization),
            other => Err(ParseJobTypeError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Working,
    Done,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Working => "working",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "working" => Ok(JobStatus::Working),
            "done" => Ok(JobStatus::Done),
            "error" => Ok(JobStatus::Error),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Externally visible job handle: a 26-character ULID, sortable by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Bad input handed to a processor. Never reaches `execute`.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid language code: {0}")]
    UnsupportedLanguage(String),

    #[error("Invalid text input")]
    EmptyText,

    #[error("Invalid strength value {0} (must be 1-5)")]
    StrengthOutOfRange(i64),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

impl ValidationError {
    pub fn class_name(&self) -> &'static str {
        match self {
            ValidationError::FileNotFound { .. } => "FileNotFound",
            ValidationError::UnsupportedLanguage(_) => "UnsupportedLanguage",
            ValidationError::EmptyText => "EmptyText",
            ValidationError::StrengthOutOfRange(_) => "StrengthOutOfRange",
            ValidationError::InvalidParameters(_) => "InvalidParameters",
        }
    }
}

/// Failure escaping the compute step.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Inference transport error: {0}")]
    Transport(String),

    #[error("Malformed inference result: {0}")]
    MalformedResult(String),
}

impl ExecutionError {
    pub fn class_name(&self) -> &'static str {
        match self {
            ExecutionError::Inference(_) => "Inference",
            ExecutionError::Transport(_) => "Transport",
            ExecutionError::MalformedResult(_) => "MalformedResult",
        }
    }
}

impl From<reqwest::Error> for ExecutionError {
    fn from(err: reqwest::Error) -> Self {
        ExecutionError::Transport(err.to_string())
    }
}

/// Anything that turns a running job into an ERROR record.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl JobError {
    /// The only part of a failure that is persisted. The message is dropped.
    pub fn class_name(&self) -> &'static str {
        match self {
            JobError::Validation(e) => e.class_name(),
            JobError::Execution(e) => e.class_name(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed queue entry: {0}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("No processor registered for job type: {0}")]
    NotRegistered(JobType),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
