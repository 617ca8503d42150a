//! Error Types

use std::path::PathBuf;
use thiserror::Error;

/// Main error type
#[derive(Debug, Clone, Error)]
pub enum CleanerError {
    #[error("Audio error: {message}")]
    Audio { message: String },
    #[error("Config error: {message}")]
    Config { message: String },
    #[error("Processing error: {message}")]
    Processing { message: String },
    #[error("Startup error: {message}")]
    Startup { message: String },
    #[error("Unknown task: {id}")]
    UnknownTask { id: u64 },
    #[error("Task {id} is still active")]
    TaskActive { id: u64 },
    #[error("Task {id} cannot be retried in state {state}")]
    NotRetryable { id: u64, state: String },
    #[error("Enqueue error: {0}")]
    Enqueue(#[from] EnqueueError),
}

impl CleanerError {
    pub fn audio<S: Into<String>>(msg: S) -> Self { Self::Audio { message: msg.into() } }
    pub fn config<S: Into<String>>(msg: S) -> Self { Self::Config { message: msg.into() } }
    pub fn processing<S: Into<String>>(msg: S) -> Self { Self::Processing { message: msg.into() } }
    pub fn startup<S: Into<String>>(msg: S) -> Self { Self::Startup { message: msg.into() } }
}

pub type Result<T> = std::result::Result<T, CleanerError>;

impl From<hound::Error> for CleanerError {
    fn from(err: hound::Error) -> Self { Self::audio(format!("WAV: {}", err)) }
}

impl From<symphonia::core::errors::Error> for CleanerError {
    fn from(err: symphonia::core::errors::Error) -> Self { Self::audio(format!("Decoder: {}", err)) }
}

/// Failure raised by a single pipeline stage.
#[derive(Debug, Clone, Error)]
#[error("{stage} failed: {cause}")]
pub struct StageError {
    pub stage: &'static str,
    pub cause: String,
}

impl StageError {
    pub fn new<S: ToString>(stage: &'static str, cause: S) -> Self {
        Self { stage, cause: cause.to_string() }
    }
}

/// Failure while committing an output file. Never retried automatically.
#[derive(Debug, Error)]
#[error("cannot write {}: {cause}", path.display())]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub cause: std::io::Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnqueueError {
    #[error("source path is empty")]
    EmptyPath,
    #[error("scheduler has been shut down")]
    Closed,
}
