//! Diff result structures handed to presentation adapters.

use serde::{Deserialize, Serialize};

use crate::models::{Attributes, Entity};

/// Outcome class of one comparison cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    /// No previous snapshot existed
    Initialized,
    /// Compared, nothing changed
    Checked,
    /// Compared, something was added, removed or modified
    Updated,
}

/// A content change for an entity present in both snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: String,

    /// Display fields taken from the current entity
    pub display: Attributes,

    pub before_fingerprint: String,
    pub after_fingerprint: String,

    /// Content text before the change, for categories that carry it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,

    /// Content text after the change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

/// Result of one comparison cycle. Sequences are sorted by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    pub status: DiffStatus,
    pub added: Vec<Entity>,
    pub removed: Vec<Entity>,
    pub updated: Vec<ChangeRecord>,
}

impl DiffResult {
    /// Check if there are any changes.
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.updated.is_empty() || !self.removed.is_empty()
    }

    /// Get the total number of changes.
    pub fn change_count(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }

    /// Whether the cycle must persist the current collection.
    pub fn requires_commit(&self) -> bool {
        self.status != DiffStatus::Checked
    }
}
