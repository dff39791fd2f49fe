//! Per-cycle report wrapping a diff result with run bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::DiffResult;

/// Something that went wrong during a cycle without invalidating its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CycleWarning {
    /// A raw record could not be normalized and was left out
    RecordSkipped { index: usize, reason: String },
    /// A record lacked natural-key fields; its id is degenerate
    MissingKeyFields {
        index: usize,
        id: String,
        fields: Vec<String>,
    },
    /// Two records normalized to the same id; the later one was kept
    DuplicateId { id: String },
    /// The previous snapshot could not be read and was treated as absent
    SnapshotUnreadable { message: String },
    /// The new snapshot could not be written
    CommitFailed { message: String },
    /// The commit guard refused to overwrite the snapshot
    CommitWithheld { message: String },
}

/// Outcome of one load → diff → commit cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub source: String,
    pub category: String,

    #[serde(flatten)]
    pub result: DiffResult,

    /// Raw records that failed normalization
    pub skipped: usize,

    /// Ids emitted more than once by the producer
    pub duplicates: usize,

    /// Whether a new snapshot was durably written
    pub committed: bool,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<CycleWarning>,
}

impl CycleReport {
    /// Warnings other than per-record data-quality notes.
    pub fn storage_warnings(&self) -> impl Iterator<Item = &CycleWarning> {
        self.warnings.iter().filter(|w| {
            matches!(
                w,
                CycleWarning::SnapshotUnreadable { .. }
                    | CycleWarning::CommitFailed { .. }
                    | CycleWarning::CommitWithheld { .. }
            )
        })
    }
}
