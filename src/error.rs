// Error handling for the transcriber worker
//
// This module defines the error types surfaced by a worker iteration.
// Task bridge and transcriber errors live next to their modules and are converted here.

use thiserror::Error;

use crate::task_bridge::BridgeError;

/// Errors that abort a single worker iteration
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Error while talking to the task bridge
    #[error("Task bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Task identifier that cannot be used as a scratch file name
    #[error("Invalid task id: {0:?}")]
    InvalidTaskId(String),
}

/// Errors when deriving the task bridge API root
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiUrlError {
    #[error("invalid URL: {0}")]
    Parse(String),

    #[error("URL cannot be used as a base: {0}")]
    NotABase(String),
}

