// File utilities for the transcriber worker
//
// This module contains helpers for the scratch copies of downloaded audio files.
// Scratch files are named after the task id so several workers can share one directory.

use log::{error, info};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::WorkerError;

/// Build the scratch path for a task's audio file
///
/// # Arguments
///
/// * `temp_dir` - Scratch directory
/// * `task_id` - Task identifier handed out by the task bridge
///
/// # Errors
///
/// Returns `WorkerError::InvalidTaskId` if the id is empty or would leave `temp_dir`
pub fn scratch_path(temp_dir: &Path, task_id: &str) -> Result<PathBuf, WorkerError> {
    let is_plain_name = !task_id.is_empty()
        && task_id != "."
        && task_id != ".."
        && !task_id.contains(['/', '\\', '\0']);

    if !is_plain_name {
        return Err(WorkerError::InvalidTaskId(task_id.to_string()));
    }

    Ok(temp_dir.join(task_id))
}

/// Remove a scratch file
///
/// This function logs errors but doesn't return them to the caller.
/// A file that was never written is not an error.
pub fn remove_scratch_file(file_path: &Path) {
    match fs::remove_file(file_path) {
        Ok(()) => info!("Removed scratch file {}", file_path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => error!("Failed to remove scratch file {}: {}", file_path.display(), e),
    }
}
