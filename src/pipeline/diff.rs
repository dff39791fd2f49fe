//! Diff calculation between a stored snapshot and a fresh collection.
//!
//! Identity decides added/removed; the fingerprint decides whether an entity
//! present on both sides was modified. Output is sorted by id so results are
//! reproducible across runs.

use std::collections::BTreeSet;

use crate::models::{ChangeRecord, Collection, DiffResult, DiffStatus, Entity};
use crate::pipeline::policy::EntityPolicy;

/// Calculator for computing diffs between snapshots of one category.
#[derive(Debug, Clone, Copy)]
pub struct DiffEngine<'a> {
    policy: &'a dyn EntityPolicy,
}

impl<'a> DiffEngine<'a> {
    /// Create a diff engine for the given category policy.
    pub fn new(policy: &'a dyn EntityPolicy) -> Self {
        Self { policy }
    }

    /// Calculate the diff between the previous snapshot (if any) and the
    /// current collection.
    pub fn diff(&self, previous: Option<&Collection>, current: &Collection) -> DiffResult {
        let Some(previous) = previous else {
            return DiffResult {
                status: DiffStatus::Initialized,
                added: sorted_entities(current.iter()),
                removed: Vec::new(),
                updated: Vec::new(),
            };
        };

        let prev_ids: BTreeSet<&str> = previous.ids().collect();
        let curr_ids: BTreeSet<&str> = current.ids().collect();

        // Added: in current but not in previous
        let added: Vec<Entity> = curr_ids
            .difference(&prev_ids)
            .filter_map(|id| current.get(id).cloned())
            .collect();

        // Removed: in previous but not in current
        let removed: Vec<Entity> = prev_ids
            .difference(&curr_ids)
            .filter_map(|id| previous.get(id).cloned())
            .collect();

        // Updated: in both but content fingerprint changed
        let updated: Vec<ChangeRecord> = prev_ids
            .intersection(&curr_ids)
            .filter_map(|id| match (previous.get(id), current.get(id)) {
                (Some(prev), Some(curr)) if prev.fingerprint != curr.fingerprint => {
                    Some(self.change_record(prev, curr))
                }
                _ => None,
            })
            .collect();

        let status = if added.is_empty() && removed.is_empty() && updated.is_empty() {
            DiffStatus::Checked
        } else {
            DiffStatus::Updated
        };

        DiffResult {
            status,
            added,
            removed,
            updated,
        }
    }

    fn change_record(&self, prev: &Entity, curr: &Entity) -> ChangeRecord {
        let (before, after) = if self.policy.carries_content() {
            (
                self.policy.content(&prev.attributes).ok(),
                self.policy.content(&curr.attributes).ok(),
            )
        } else {
            (None, None)
        };

        ChangeRecord {
            id: curr.id.clone(),
            display: self.policy.display(&curr.attributes),
            before_fingerprint: prev.fingerprint.clone(),
            after_fingerprint: curr.fingerprint.clone(),
            before,
            after,
        }
    }
}

fn sorted_entities<'e>(entities: impl Iterator<Item = &'e Entity>) -> Vec<Entity> {
    let mut out: Vec<Entity> = entities.cloned().collect();
    out.sort_by(|a, b| a.id.cmp(&b.id));
    out
}

/// Convenience function to calculate a diff.
pub fn calculate_diff(
    policy: &dyn EntityPolicy,
    previous: Option<&Collection>,
    current: &Collection,
) -> DiffResult {
    DiffEngine::new(policy).diff(previous, current)
}
