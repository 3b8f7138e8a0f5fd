// Transcriber worker data models
//
// This module contains the payloads exchanged with the task bridge
// and the segment type produced by transcription.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::config::RunMetadata;

/// Body of a take request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TakeRequest {
    /// Task type this worker handles
    #[serde(rename = "type")]
    pub task_type: String,
    /// Name of the claiming worker
    pub worker: String,
}

/// Task handed out by the task bridge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Task identifier, used for every follow-up call
    #[serde(deserialize_with = "task_id_from_json")]
    pub id: String,
    /// Remaining task fields, kept for logging only
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Task ids are opaque, but some bridges send them as numbers.
fn task_id_from_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

/// Body of a progress update; the bridge expects the percentage as a string
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub progress: String,
}

impl ProgressUpdate {
    pub fn new(percent: u8) -> Self {
        Self {
            progress: percent.to_string(),
        }
    }
}

/// Transcription segment with timestamp information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Segment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Segment text
    pub text: String,
}

impl Segment {
    /// Build a segment, trimming whitespace the model leaves around the text
    pub fn new(start: f64, end: f64, text: &str) -> Self {
        Self {
            start,
            end,
            text: text.trim().to_string(),
        }
    }
}

/// What came out of the transcription step for one task
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptionOutcome {
    /// Model ran to completion
    Transcribed {
        language: String,
        segments: Vec<Segment>,
    },
    /// Download or transcription failed with this message
    Failed(String),
}

/// Result reported to the task bridge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskResult {
    /// Detected language, absent on failure
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub language: Option<String>,
    /// Ordered segments, absent on failure
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub texts: Option<Vec<Segment>>,
    /// Failure message, absent on success
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    /// Seconds from claim to report
    pub duration: f64,
    pub device: String,
    pub model: String,
    pub worker: String,
    pub repository: String,
    pub version: String,
    pub library: String,
}

impl TaskResult {
    pub fn new(outcome: TranscriptionOutcome, duration: f64, metadata: &RunMetadata) -> Self {
        let (language, texts, error) = match outcome {
            TranscriptionOutcome::Transcribed { language, segments } => {
                (Some(language), Some(segments), None)
            }
            TranscriptionOutcome::Failed(message) => (None, None, Some(message)),
        };

        Self {
            language,
            texts,
            error,
            duration,
            device: metadata.device.clone(),
            model: metadata.model.clone(),
            worker: metadata.worker.clone(),
            repository: metadata.repository.clone(),
            version: metadata.version.clone(),
            library: metadata.library.clone(),
        }
    }
}

/// Body of a completion report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionReport {
    pub result: TaskResult,
}
