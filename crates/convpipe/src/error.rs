//! Error types for the pipeline.

use convpipe_core::{RecordKind, ValidationError};
use convpipe_store::StoreError;
use thiserror::Error;

/// Errors that can occur while configuring or running the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// A produced record failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The consumer side of a queue is gone.
    #[error("{0} queue is disconnected")]
    QueueDisconnected(RecordKind),

    /// A pipeline task panicked or was aborted.
    #[error("task failed: {0}")]
    Task(String),

    /// Installing an OS signal handler failed.
    #[error("signal handler error: {0}")]
    Signal(#[from] std::io::Error),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
