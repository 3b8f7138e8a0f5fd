// Configuration validation module for the transcriber worker
//
// This module validates the startup values before the worker starts, so a wrong
// URL or an empty worker name is reported once at startup instead of on every poll.
//
// Errors prevent startup; warnings are logged and the value is used as given.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{error, info, warn};

use crate::config::{defaults, WorkerConfig};

/// Raw startup values, as given on the command line or in the environment
#[derive(Debug, Clone, PartialEq)]
pub struct RawConfig {
    pub taskbridge_url: String,
    pub worker: String,
    pub model: String,
    pub device: String,
    pub command_path: PathBuf,
    pub models_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub library: String,
    pub poll_interval_seconds: u64,
}

/// Configuration validation errors with detailed context
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub value: String,
    pub error_type: ConfigErrorType,
    pub message: String,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigErrorType {
    InvalidValue,
    InvalidFormat,
    InvalidRange,
    FileNotFound,
    Required,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Configuration error in '{}' ({:?}): {} (value: '{}')",
            self.field, self.error_type, self.message, self.value
        )?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " - Suggestion: {}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigValidationError {}

/// Configuration validation results
#[derive(Debug, Default)]
pub struct ValidationResults {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ConfigValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ConfigValidationError) {
        self.warnings.push(warning);
    }

    pub fn print_summary(&self) {
        if !self.errors.is_empty() {
            error!(
                "Configuration validation found {} error(s):",
                self.errors.len()
            );
            for (i, err) in self.errors.iter().enumerate() {
                error!("  {}. {}", i + 1, err);
            }
        }

        if !self.warnings.is_empty() {
            warn!(
                "Configuration validation found {} warning(s):",
                self.warnings.len()
            );
            for (i, warn) in self.warnings.iter().enumerate() {
                warn!("  {}. {}", i + 1, warn);
            }
        }

        if self.is_valid() && self.warnings.is_empty() {
            info!("Configuration validation passed successfully");
        } else if self.is_valid() {
            info!(
                "Configuration validation passed with {} warning(s)",
                self.warnings.len()
            );
        }
    }
}

/// Individual field validators
pub mod validators {
    use super::*;
    use reqwest::Url;

    pub type ValidationResult<T> = Result<T, ConfigValidationError>;

    fn problem(
        field: &str,
        value: &str,
        error_type: ConfigErrorType,
        message: impl Into<String>,
        suggestion: Option<&str>,
    ) -> ConfigValidationError {
        ConfigValidationError {
            field: field.to_string(),
            value: value.to_string(),
            error_type,
            message: message.into(),
            suggestion: suggestion.map(String::from),
        }
    }

    pub fn validate_taskbridge_url(field: &str, value: &str) -> ValidationResult<Url> {
        if value.trim().is_empty() {
            return Err(problem(
                field,
                value,
                ConfigErrorType::Required,
                "Task bridge URL is required",
                Some("Pass --taskbridgeurl or set TASKBRIDGE_URL"),
            ));
        }

        let api_url = WorkerConfig::api_url_from(value).map_err(|e| {
            problem(
                field,
                value,
                ConfigErrorType::InvalidFormat,
                e.to_string(),
                Some("Use the root URL of the task bridge, e.g. https://taskbridge.ai/"),
            )
        })?;

        match api_url.scheme() {
            "http" | "https" => Ok(api_url),
            scheme => Err(problem(
                field,
                value,
                ConfigErrorType::InvalidValue,
                format!("Unsupported scheme '{}'", scheme),
                Some("Use an http:// or https:// URL"),
            )),
        }
    }

    pub fn validate_worker_name(field: &str, value: &str) -> ValidationResult<String> {
        let name = value.trim();
        if name.is_empty() {
            return Err(problem(
                field,
                value,
                ConfigErrorType::Required,
                "Worker name is required",
                Some("Pass --worker or set TRANSCRIBER_WORKER to a unique name"),
            ));
        }
        Ok(name.to_string())
    }

    pub fn validate_model(field: &str, value: &str) -> ValidationResult<String> {
        if value.trim().is_empty() {
            return Err(problem(
                field,
                value,
                ConfigErrorType::Required,
                "Model is required",
                Some("Pass --model or set TRANSCRIBER_MODEL"),
            ));
        }
        Ok(value.trim().to_string())
    }

    /// Model names outside the known sizes are allowed, but usually a typo
    pub fn check_known_model(field: &str, value: &str) -> ValidationResult<()> {
        if defaults::KNOWN_MODELS.contains(&value) {
            Ok(())
        } else {
            Err(problem(
                field,
                value,
                ConfigErrorType::InvalidValue,
                "Unknown whisper model size",
                Some("Known sizes are tiny, base, small, medium, large-v2 and large-v3"),
            ))
        }
    }

    pub fn validate_poll_interval(field: &str, seconds: u64) -> ValidationResult<Duration> {
        if (1..=3600).contains(&seconds) {
            Ok(Duration::from_secs(seconds))
        } else {
            Err(problem(
                field,
                &seconds.to_string(),
                ConfigErrorType::InvalidRange,
                "Poll interval must be between 1 and 3600 seconds",
                Some("The default is 3 seconds"),
            ))
        }
    }

    pub fn check_file_exists(field: &str, path: &Path) -> ValidationResult<()> {
        if path.is_file() {
            Ok(())
        } else {
            Err(problem(
                field,
                &path.display().to_string(),
                ConfigErrorType::FileNotFound,
                "Transcriber command not found",
                Some("Every task will fail until the command exists"),
            ))
        }
    }
}

pub struct WorkerConfigValidator;

impl WorkerConfigValidator {
    /// Validate all startup values and return the worker configuration
    pub fn validate(raw: &RawConfig) -> Result<WorkerConfig, ValidationResults> {
        let mut results = ValidationResults::new();

        let api_url = validators::validate_taskbridge_url("taskbridge_url", &raw.taskbridge_url)
            .map_err(|e| results.add_error(e))
            .ok();
        let worker = validators::validate_worker_name("worker", &raw.worker)
            .map_err(|e| results.add_error(e))
            .ok();
        let model = validators::validate_model("model", &raw.model)
            .map_err(|e| results.add_error(e))
            .ok();
        let poll_interval =
            validators::validate_poll_interval("poll_interval", raw.poll_interval_seconds)
                .map_err(|e| results.add_error(e))
                .ok();

        if let Some(model) = &model {
            if let Err(warning) = validators::check_known_model("model", model) {
                results.add_warning(warning);
            }
        }
        if let Err(warning) = validators::check_file_exists("command", &raw.command_path) {
            results.add_warning(warning);
        }

        results.print_summary();

        match (api_url, worker, model, poll_interval) {
            (Some(api_url), Some(worker), Some(model), Some(poll_interval))
                if results.is_valid() =>
            {
                Ok(WorkerConfig {
                    api_url,
                    worker,
                    model,
                    device: raw.device.clone(),
                    command_path: raw.command_path.clone(),
                    models_dir: raw.models_dir.clone(),
                    temp_dir: raw.temp_dir.clone(),
                    library: raw.library.clone(),
                    poll_interval,
                })
            }
            _ => Err(results),
        }
    }
}
