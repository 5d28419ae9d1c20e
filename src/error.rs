//! Error types for senti

use crate::pipeline::Task;
use std::io;
use thiserror::Error;

/// Result type alias for senti operations
pub type Result<T> = std::result::Result<T, SentiError>;

/// Errors surfaced by resolution, inference and the supporting stack
///
/// Every variant is recoverable: the session reports it as text and the
/// caller may simply retry.
#[derive(Error, Debug)]
pub enum SentiError {
    /// Input text was empty or whitespace only
    #[error("Missing input: input some query")]
    MissingInput,

    /// No model handle is available for the requested task
    #[error("Model unavailable: the model is not loaded")]
    ModelUnavailable,

    /// Both the cache-only and the remote construction attempts failed
    #[error("Resolution failed (cache: {cache}; remote: {remote})")]
    ResolutionFailure { cache: String, remote: String },

    /// The model raised an error while running
    #[error("{0}")]
    InferenceException(String),

    /// Another invocation is in flight for the same task slot
    #[error("Busy: a {0} request is already running")]
    Busy(Task),

    /// Model files are not present in the cache and remote fetching is disallowed
    #[error("Cache miss: {0}")]
    CacheMiss(String),

    /// Model files are not present in the local model directory
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// The inference library could not construct a pipeline
    #[error("Construction error: {0}")]
    Construction(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Network error (model downloads, inference server)
    #[error("Network error: {0}")]
    Network(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Not implemented (feature disabled at compile time)
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

impl From<serde_json::Error> for SentiError {
    fn from(err: serde_json::Error) -> Self {
        SentiError::Parse(err.to_string())
    }
}
