// Command line interface for the transcriber worker
//
// Every flag can also be given as an environment variable, which in turn can
// come from the configuration file.

use clap::Parser;
use std::path::PathBuf;

use crate::config::{defaults, VERSION};
use crate::config_validator::RawConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "taskworker-transcribe", version = VERSION, about = "Transcribes audio files handed out by a task bridge")]
pub struct Cli {
    /// Root URL of the task bridge, e.g. https://taskbridge.ai/
    #[arg(long = "taskbridgeurl", env = "TASKBRIDGE_URL")]
    pub taskbridge_url: String,

    /// Unique name of this worker
    #[arg(long, env = "TRANSCRIBER_WORKER")]
    pub worker: String,

    /// Whisper model size: tiny, base, small, medium, large-v2 or large-v3
    #[arg(long, env = "TRANSCRIBER_MODEL")]
    pub model: String,

    /// Device to run the model on
    #[arg(long, env = "TRANSCRIBER_DEVICE", default_value = defaults::DEVICE)]
    pub device: String,

    /// Transcription command speaking JSON lines on stdout
    #[arg(long = "command", env = "TRANSCRIBER_CMD", default_value = defaults::COMMAND)]
    pub command_path: PathBuf,

    /// Directory the models are stored in
    #[arg(long, env = "TRANSCRIBER_MODELS_DIR", default_value = defaults::MODELS_DIR)]
    pub models_dir: PathBuf,

    /// Directory for downloaded audio files
    #[arg(long, env = "TRANSCRIBER_TMP_DIR", default_value = defaults::TEMP_DIR)]
    pub temp_dir: PathBuf,

    /// Library identifier reported with results
    #[arg(long, env = "TRANSCRIBER_LIBRARY", default_value = defaults::LIBRARY)]
    pub library: String,

    /// Seconds to wait when no task is available
    #[arg(long = "poll-interval", env = "TRANSCRIBER_POLL_INTERVAL_SECONDS", default_value_t = defaults::POLL_INTERVAL_SECONDS)]
    pub poll_interval_seconds: u64,
}

impl From<Cli> for RawConfig {
    fn from(cli: Cli) -> Self {
        RawConfig {
            taskbridge_url: cli.taskbridge_url,
            worker: cli.worker,
            model: cli.model,
            device: cli.device,
            command_path: cli.command_path,
            models_dir: cli.models_dir,
            temp_dir: cli.temp_dir,
            library: cli.library,
            poll_interval_seconds: cli.poll_interval_seconds,
        }
    }
}
