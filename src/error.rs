//! Error types for the Kinesis sink

use crate::config::ValidationFailure;
use thiserror::Error;

/// Main error type for sink operations
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Invalid configuration: {}", format_failures(.0))]
    Configuration(Vec<ValidationFailure>),

    #[error("No value bound for deferred property {0}")]
    UnresolvedMacro(String),

    #[error("Invalid shard count {0}, must be at least 1")]
    InvalidShardCount(i32),

    #[error("Failed to provision stream {stream}: {reason}")]
    StreamProvisioning { stream: String, reason: String },

    #[error("Failed to write record with partition key {partition_key} to {stream}: {reason}")]
    Write {
        stream: String,
        partition_key: String,
        reason: String,
    },

    #[error("Shutdown requested")]
    Shutdown,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SinkError {
    pub fn provisioning(stream: &str, reason: impl Into<String>) -> Self {
        SinkError::StreamProvisioning {
            stream: stream.to_string(),
            reason: reason.into(),
        }
    }

    /// Validation failures carried by a configuration error
    pub fn failures(&self) -> &[ValidationFailure] {
        match self {
            SinkError::Configuration(failures) => failures,
            _ => &[],
        }
    }

    pub fn is_write_failure(&self) -> bool {
        matches!(self, SinkError::Write { .. })
    }
}

fn format_failures(failures: &[ValidationFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for sink operations
pub type Result<T> = std::result::Result<T, SinkError>;
