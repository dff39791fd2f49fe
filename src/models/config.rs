//! Application configuration structures.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where snapshots live
    #[serde(default)]
    pub storage: StorageConfig,

    /// Batch execution settings
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Optional guard against committing suspiciously small collections
    #[serde(default)]
    pub guard: GuardConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Category policies added to, or overriding, the built-in ones
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.storage.root.trim().is_empty() {
            return Err(AppError::validation("storage.root is empty"));
        }
        if self.runner.max_concurrent == 0 {
            return Err(AppError::validation("runner.max_concurrent must be > 0"));
        }
        if self.guard.max_drop_percent > 100 {
            return Err(AppError::validation(
                "guard.max_drop_percent must be between 0 and 100",
            ));
        }

        let mut seen = HashSet::new();
        for category in &self.categories {
            category.validate()?;
            if !seen.insert(category.name.as_str()) {
                return Err(AppError::validation(format!(
                    "category '{}' is defined more than once",
                    category.name
                )));
            }
        }
        Ok(())
    }

    /// Resolve the snapshot root against a base directory.
    pub fn storage_root(&self, base: &Path) -> PathBuf {
        base.join(&self.storage.root)
    }
}

/// Snapshot storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `{source}/{category}.json` snapshots
    #[serde(default = "defaults::storage_root")]
    pub root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: defaults::storage_root(),
        }
    }
}

/// Batch execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Maximum cycles in flight at once
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Commit guard settings. Disabled unless `enabled = true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Maximum allowed drop percentage (0-100)
    #[serde(default = "defaults::max_drop_percent")]
    pub max_drop_percent: u8,

    /// Previous snapshots smaller than this are never guarded
    #[serde(default = "defaults::min_baseline")]
    pub min_baseline: usize,

    /// Allow committing an empty collection over a non-empty snapshot
    #[serde(default)]
    pub allow_empty: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_drop_percent: defaults::max_drop_percent(),
            min_baseline: defaults::min_baseline(),
            allow_empty: false,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

/// Field-level description of how a category derives identity and content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Category name, e.g. "position"
    pub name: String,

    /// Natural-key fields joined into the id
    pub key_fields: Vec<String>,

    /// Fields whose text feeds the fingerprint
    #[serde(default)]
    pub content_fields: Vec<String>,

    /// Fields copied into change records
    #[serde(default)]
    pub display_fields: Vec<String>,

    /// Field holding a permanent source-side key, preferred when present
    #[serde(default)]
    pub stable_key_field: Option<String>,

    /// Field name given to bare scalar records (e.g. a list of names)
    #[serde(default)]
    pub scalar_field: Option<String>,

    /// Carry before/after content text in change records
    #[serde(default)]
    pub include_content: bool,
}

impl CategoryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("category name is empty"));
        }
        if self.key_fields.is_empty() && self.stable_key_field.is_none() {
            return Err(AppError::validation(format!(
                "category '{}' needs key_fields or a stable_key_field",
                self.name
            )));
        }
        if self.include_content && self.content_fields.is_empty() {
            return Err(AppError::validation(format!(
                "category '{}' sets include_content without content_fields",
                self.name
            )));
        }
        Ok(())
    }
}

mod defaults {
    pub fn storage_root() -> String {
        "data".into()
    }
    pub fn max_concurrent() -> usize {
        4
    }
    pub fn max_drop_percent() -> u8 {
        20
    }
    pub fn min_baseline() -> usize {
        10
    }
    pub fn log_level() -> String {
        "info".into()
    }
}
