//! Error types for the extraction pipeline
//!
//! Only [`ExtractionError`] crosses the public boundary of
//! `MetadataExtractor::process_frame`. Schema problems are handled locally and
//! surface as [`SchemaIssue`]s inside `processing_notes`, never as errors.

use std::fmt;
use thiserror::Error;

/// Transport-level failures reported by a vision service client.
///
/// Every variant is treated as transient by the orchestrator and retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VisionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("Vision service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response from vision service: {0}")]
    InvalidResponse(String),

    #[error("Vision client is closed")]
    Closed,
}

impl From<reqwest::Error> for VisionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VisionError::Timeout(0)
        } else if err.is_decode() {
            VisionError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            VisionError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            VisionError::Network(err.to_string())
        }
    }
}

/// Terminal error returned to callers once retries are exhausted
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to extract metadata after {attempts} attempts: {source}")]
    ExtractionFailed {
        attempts: u32,
        #[source]
        source: VisionError,
    },
}

impl ExtractionError {
    pub fn attempts(&self) -> u32 {
        match self {
            ExtractionError::ExtractionFailed { attempts, .. } => *attempts,
        }
    }

    pub fn last_error(&self) -> &VisionError {
        match self {
            ExtractionError::ExtractionFailed { source, .. } => source,
        }
    }
}

/// Invalid configuration values
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// A single schema violation found while validating a raw result
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaIssue {
    pub field: String,
    pub reason: String,
}

impl SchemaIssue {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Render a list of issues as a single human-readable line
pub fn describe_issues(issues: &[SchemaIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
