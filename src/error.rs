use std::path::PathBuf;
use thiserror::Error;

use crate::subprocess::ProcessError;

/// Failure of a single worker invocation.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Worker exited with code {code}: {stderr}")]
    Exit { code: i32, stderr: String },

    #[error("Worker terminated by signal {0}")]
    Signal(i32),

    #[error("Worker timed out")]
    Timeout,

    #[error("Malformed worker response: {0}")]
    Malformed(String),

    #[error("HTTP transport error: {0}")]
    Http(String),

    #[error("Failed to read segment: {0}")]
    Read(#[from] std::io::Error),

    #[error("Worker task failed to complete: {0}")]
    Join(String),
}

impl From<serde_json::Error> for WorkerError {
    fn from(err: serde_json::Error) -> Self {
        WorkerError::Malformed(err.to_string())
    }
}

impl From<reqwest::Error> for WorkerError {
    fn from(err: reqwest::Error) -> Self {
        WorkerError::Http(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker {index} ({worker}) failed: {source}")]
    Worker {
        index: usize,
        worker: String,
        #[source]
        source: WorkerError,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        EngineError::Configuration(message.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, EngineError::Configuration(_))
    }

    pub fn is_worker_failure(&self) -> bool {
        matches!(self, EngineError::Worker { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
