// Transcriber worker library
//
// This crate implements a worker that takes transcription tasks from a task bridge,
// transcribes their audio files and reports progress and results back.

pub mod cli;
pub mod config;
pub mod config_loader;
pub mod config_validator;
pub mod error;
pub mod file_utils;
pub mod models;
pub mod shutdown;
pub mod task_bridge;
pub mod transcriber;
pub mod worker;

// Re-export common types for easier access
pub use config::{RunMetadata, WorkerConfig};
pub use error::WorkerError;
pub use models::{CompletionReport, Segment, TakeRequest, Task, TaskResult, TranscriptionOutcome};
pub use task_bridge::{BridgeError, HttpTaskBridge, TaskBridge};
pub use transcriber::{CommandTranscriber, TranscribeError, Transcriber, Transcription, TranscriptionInfo};
pub use worker::{ProgressTracker, Worker};
