// src/error.rs

//! Unified error handling for the tracker.

use std::fmt;

use thiserror::Error;

/// Result type alias for tracker operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// AWS S3 error
    #[error("S3 error: {0}")]
    S3(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// No policy registered for the requested category
    #[error("Unknown category '{0}'")]
    UnknownCategory(String),

    /// Snapshot store failure with the key it concerns
    #[error("Storage error for {key}: {message}")]
    Storage { key: String, message: String },

    /// Commit guard refused a sharp drop in entity count
    #[error(
        "Commit withheld: {previous_count} → {current_count} entities ({drop_percent:.1}% drop > {threshold_percent}%)"
    )]
    GuardTriggered {
        current_count: usize,
        previous_count: usize,
        drop_percent: f64,
        threshold_percent: u8,
    },

    /// Commit guard refused an empty collection
    #[error("Commit withheld: empty collection over {previous_count} stored entities")]
    EmptyCollection { previous_count: usize },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a storage error with context.
    pub fn storage(key: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Storage {
            key: key.into(),
            message: message.to_string(),
        }
    }
}

/// Why a single raw record could not be normalized.
///
/// These never abort a cycle; the coordinator skips the record and counts it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The record is neither an object nor a scalar the category accepts
    #[error("expected an object record, got {0}")]
    NotAnObject(&'static str),

    /// A field feeding the id or fingerprint holds a nested value
    #[error("field '{field}' must be a scalar, got {kind}")]
    NonScalarField { field: String, kind: &'static str },
}
