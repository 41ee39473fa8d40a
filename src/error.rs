//! Error types for the generation orchestrator

use std::time::Duration;
use thiserror::Error;

/// Result type for generator operations
pub type Result<T> = std::result::Result<T, GeneratorError>;

/// Errors raised while generating a beat map
///
/// Every variant is terminal for its scope: there are no automatic retries.
/// `InvalidNotes` fails a single difficulty when a job requested `all`;
/// everything else fails the owning job but never its siblings.
#[derive(Error, Debug)]
pub enum GeneratorError {
    /// Inference server process could not be launched
    #[error("failed to spawn inference server: {0}")]
    SpawnFailed(String),

    /// Readiness marker did not appear within the startup window
    #[error("inference server not ready within {0:?}")]
    StartupTimeout(Duration),

    /// Inference server exited before signalling readiness
    #[error("inference server exited before ready: {0}")]
    CrashedBeforeReady(String),

    /// Inference server returned a non-success HTTP status or the
    /// connection failed mid-request
    #[error("inference server request failed: {0}")]
    RpcFailed(String),

    /// Model output was missing or not a well-formed note list
    #[error("invalid notes from model: {0}")]
    InvalidNotes(String),

    /// Job exceeded the per-file processing ceiling
    #[error("job exceeded the {0:?} processing ceiling")]
    JobTimeout(Duration),

    /// Bundle files could not be written or moved into place
    #[error("failed to package bundle: {0}")]
    PackagingFailed(String),

    /// Job was cancelled before it could finish
    #[error("job cancelled")]
    Cancelled,

    /// Configuration loading or validation error
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
