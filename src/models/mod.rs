// src/models/mod.rs

//! Domain models for the tracker.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod diff;
mod entity;
mod report;

// Re-export all public types
pub use config::{
    CategoryConfig, Config, GuardConfig, LoggingConfig, RunnerConfig, StorageConfig,
};
pub use diff::{ChangeRecord, DiffResult, DiffStatus};
pub use entity::{Attributes, Collection, Entity, SourceKey};
pub use report::{CycleReport, CycleWarning};
