// Configuration loader for the transcriber worker
//
// This module handles loading configuration from the TOML configuration file.
// Values are exported as environment variables so command line flags and the
// environment can still override them.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use toml::Value;

const CONFIG_FILE_PATH: &str = "transcriber_worker.conf";
const ENV_CONFIG_FILE: &str = "TRANSCRIBER_CONFIG_FILE";

/// Path of the configuration file, `TRANSCRIBER_CONFIG_FILE` or the default
pub fn config_file_path() -> PathBuf {
    env::var(ENV_CONFIG_FILE)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(CONFIG_FILE_PATH))
}

/// Loads configuration from the default TOML file
///
/// Configuration precedence (highest to lowest):
/// 1. Command line flags
/// 2. Environment variables
/// 3. Configuration file values
/// 4. Default values (not handled here)
///
/// # Returns
///
/// Returns true if the config file was successfully loaded, false otherwise
pub fn load_config() -> bool {
    load_config_from(&config_file_path())
}

/// Loads configuration from the given TOML file
pub fn load_config_from(config_path: &Path) -> bool {
    if !config_path.exists() {
        debug!("Configuration file not found at: {}", config_path.display());
        return false;
    }

    let config_content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read configuration file: {}", e);
            return false;
        }
    };

    let config_map = match parse_flat_toml(&config_content) {
        Ok(map) => map,
        Err(e) => {
            warn!("Failed to parse configuration file: {}", e);
            return false;
        }
    };

    // Set environment variables from config file if they don't already exist
    for (key, value) in config_map {
        if env::var(&key).is_err() {
            debug!("Setting env var from config file: {} = {}", key, value);
            env::set_var(key, value);
        } else {
            debug!("Env var already exists, skipping: {}", key);
        }
    }

    info!("Configuration loaded from {}", config_path.display());
    true
}

/// Convert a flat TOML document into key-value pairs
fn parse_flat_toml(content: &str) -> Result<HashMap<String, String>, toml::de::Error> {
    let config_values: Value = content.parse()?;
    let mut config_map = HashMap::new();

    if let Value::Table(table) = config_values {
        for (key, value) in table {
            match value {
                Value::String(s) => {
                    config_map.insert(key, s);
                }
                Value::Integer(i) => {
                    config_map.insert(key, i.to_string());
                }
                Value::Float(f) => {
                    config_map.insert(key, f.to_string());
                }
                Value::Boolean(b) => {
                    config_map.insert(key, b.to_string());
                }
                _ => {
                    warn!("Skipping unsupported TOML value type for key: {}", key);
                }
            }
        }
    }

    Ok(config_map)
}
