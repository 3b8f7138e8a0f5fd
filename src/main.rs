use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use env_logger::Env;
use log::{error, info};
use tokio::sync::watch;

use taskworker_transcribe::cli::Cli;
use taskworker_transcribe::config::VERSION;
use taskworker_transcribe::config_loader;
use taskworker_transcribe::config_validator::{RawConfig, WorkerConfigValidator};
use taskworker_transcribe::shutdown;
use taskworker_transcribe::{CommandTranscriber, HttpTaskBridge, Worker};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logger
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    info!("Transcriber Version {}", VERSION);

    // The config file only fills in environment variables, so it must come before parsing
    config_loader::load_config();
    let raw = RawConfig::from(Cli::parse());

    let config = match WorkerConfigValidator::validate(&raw) {
        Ok(config) => config,
        Err(_) => {
            error!("Invalid configuration, exiting");
            return ExitCode::FAILURE;
        }
    };

    info!("Worker name: {}", config.worker);
    info!("Using API URL {}", config.api_url);
    info!("Using whisper model {} on {}", config.model, config.device);
    info!("Transcriber command: {}", config.command_path.display());
    info!("Using temp directory: {}", config.temp_dir.display());

    if let Err(e) = config.ensure_temp_dir() {
        error!(
            "Failed to create temp directory {}: {}",
            config.temp_dir.display(),
            e
        );
        return ExitCode::FAILURE;
    }

    let bridge = Arc::new(HttpTaskBridge::new(config.api_url.clone()));
    let transcriber = Arc::new(CommandTranscriber {
        command_path: config.command_path.clone(),
        model: config.model.clone(),
        models_dir: config.models_dir.clone(),
        device: config.device.clone(),
        library: config.library.clone(),
    });
    let worker = Worker::new(config, bridge, transcriber);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if shutdown::relay_interrupts(shutdown::ctrl_c_presses(), shutdown_tx).await {
            std::process::exit(shutdown::INTERRUPTED_EXIT_CODE);
        }
    });

    worker.run_until(shutdown_rx).await;
    ExitCode::SUCCESS
}
