use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failures that stop a run before it produces a report.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Sprint scope could not be resolved: {0}")]
    ScopeResolution(String),

    #[error("Work item `{key}` appears more than once")]
    DuplicateWorkItem { key: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Report could not be rendered: {0}")]
    Report(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn scope(message: impl ToString) -> Self {
        Self::ScopeResolution(message.to_string())
    }

    pub fn config(message: impl ToString) -> Self {
        Self::Config(message.to_string())
    }
}

/// A single metric source failing. Never escapes the collector: its
/// `Display` text becomes the reason of an unavailable metric.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("fetcher panicked: {0}")]
    Panicked(String),
}

/// The external narrative generator failing. Always absorbed by falling
/// back to the built-in summary.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NarrativeError {
    #[error("generator failed: {0}")]
    Generator(String),

    #[error("generator timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("generator returned empty text")]
    Empty,
}
