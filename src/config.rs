// Transcriber worker configuration
//
// This module contains the configuration structures and constants for the worker.
// The configuration is built once at startup and handed to the worker explicitly.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

use crate::error::ApiUrlError;

/// Default values for configuration
pub mod defaults {
    // Task type requested from the task bridge
    pub const TASK_TYPE: &str = "transcribe";

    // API version segment appended to the task bridge URL
    pub const API_VERSION: &str = "v2";

    // Default device for inference
    pub const DEVICE: &str = "cuda";

    // Transcription command invoked for every task
    pub const COMMAND: &str = "./faster_whisper_jsonl.sh";

    // Directory the transcription command downloads models into
    pub const MODELS_DIR: &str = "./models/faster-whisper";

    // Scratch directory for downloaded audio files
    pub const TEMP_DIR: &str = "./temp";

    // Library identifier reported with every result
    pub const LIBRARY: &str = "faster-whisper";

    // Seconds to wait after a claim attempt that yielded no task
    pub const POLL_INTERVAL_SECONDS: u64 = 3;

    // Known whisper model sizes
    pub const KNOWN_MODELS: [&str; 6] = ["tiny", "base", "small", "medium", "large-v2", "large-v3"];
}

/// Repository reported with every result
pub const REPOSITORY: &str = env!("CARGO_PKG_REPOSITORY");

/// Software version reported with every result
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration for the worker loop
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Root of the task bridge API, always ending with a slash
    pub api_url: Url,
    /// Unique name of this worker
    pub worker: String,
    /// Whisper model size or name
    pub model: String,
    /// Device the model runs on
    pub device: String,
    /// Path to the transcription command
    pub command_path: PathBuf,
    /// Directory holding downloaded models
    pub models_dir: PathBuf,
    /// Directory for scratch copies of audio files
    pub temp_dir: PathBuf,
    /// Library identifier reported with results
    pub library: String,
    /// Backoff after a claim attempt that yielded no task
    pub poll_interval: Duration,
}

impl WorkerConfig {
    /// Derive the API root from the task bridge URL.
    ///
    /// `https://taskbridge.ai` and `https://taskbridge.ai/` both yield
    /// `https://taskbridge.ai/api/v2/`.
    pub fn api_url_from(taskbridge_url: &str) -> Result<Url, ApiUrlError> {
        let mut base = taskbridge_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base).map_err(|e| ApiUrlError::Parse(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(ApiUrlError::NotABase(taskbridge_url.to_string()));
        }
        base.join(&format!("api/{}/", defaults::API_VERSION))
            .map_err(|e| ApiUrlError::Parse(e.to_string()))
    }

    /// Ensures the scratch directory exists
    pub fn ensure_temp_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.temp_dir)
    }

    /// Static metadata attached to every reported result
    pub fn run_metadata(&self) -> RunMetadata {
        RunMetadata {
            device: self.device.clone(),
            model: self.model.clone(),
            worker: self.worker.clone(),
            repository: REPOSITORY.to_string(),
            version: VERSION.to_string(),
            library: self.library.clone(),
        }
    }
}

/// Per-run metadata, identical for every task this process handles
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunMetadata {
    pub device: String,
    pub model: String,
    pub worker: String,
    pub repository: String,
    pub version: String,
    pub library: String,
}
