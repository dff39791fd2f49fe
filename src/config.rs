// src/config.rs

//! Configuration loading utilities.
//!
//! Convenience functions for loading configuration and cycle inputs from
//! files, and for wiring a coordinator from a loaded configuration.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::pipeline::{BatchManifest, CircuitBreaker, PolicyRegistry, RunCoordinator};
use crate::storage::SnapshotStore;

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file is missing or unreadable, but a file
/// that loads and then fails validation is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load_or_default(path);
    config
        .validate()
        .map_err(|e| AppError::config(format!("Invalid config {path:?}: {e}")))?;
    Ok(config)
}

/// Load a batch manifest (`{"cycles": [...]}`) from a JSON file.
pub fn load_manifest(path: &Path) -> Result<BatchManifest> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Load the raw records of one cycle from a JSON file holding an array.
pub fn load_records(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&content)? {
        Value::Array(records) => Ok(records),
        other => Err(AppError::validation(format!(
            "{path:?} must hold a JSON array of records, found {}",
            crate::utils::value_kind(&other)
        ))),
    }
}

/// Build a coordinator for `store` with the configured categories and guard.
pub fn build_coordinator(config: &Config, store: Arc<dyn SnapshotStore>) -> RunCoordinator {
    let coordinator = RunCoordinator::new(store, PolicyRegistry::from_config(&config.categories));
    match CircuitBreaker::from_config(&config.guard) {
        Some(guard) => coordinator.with_guard(guard),
        None => coordinator,
    }
}

/// Override configuration values from the environment.
///
/// Used where no config file is shipped (Lambda).
pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(concurrent) = std::env::var("MAX_CONCURRENT") {
        match concurrent.parse() {
            Ok(n) if n > 0 => config.runner.max_concurrent = n,
            _ => log::warn!("Ignoring invalid MAX_CONCURRENT value '{}'", concurrent),
        }
    }

    if let Ok(enabled) = std::env::var("GUARD_ENABLED") {
        config.guard.enabled = matches!(enabled.as_str(), "1" | "true" | "yes");
    }
}
