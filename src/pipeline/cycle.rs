//! Run coordinator: one load → diff → commit cycle per key.
//!
//! Cycles on the same key are serialized through a per-key lock so two
//! cycles can never interleave their read and commit. Cycles on different
//! keys proceed independently.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{Collection, CycleReport, CycleWarning, DiffResult, SourceKey};
use crate::pipeline::circuit_breaker::CircuitBreaker;
use crate::pipeline::diff::DiffEngine;
use crate::pipeline::normalize::normalize_all;
use crate::pipeline::policy::{EntityPolicy, PolicyRegistry};
use crate::storage::SnapshotStore;

/// Orchestrates comparison cycles against a snapshot store.
pub struct RunCoordinator {
    store: Arc<dyn SnapshotStore>,
    policies: PolicyRegistry,
    guard: Option<CircuitBreaker>,
    locks: Mutex<HashMap<SourceKey, Arc<Mutex<()>>>>,
}

impl RunCoordinator {
    pub fn new(store: Arc<dyn SnapshotStore>, policies: PolicyRegistry) -> Self {
        Self {
            store,
            policies,
            guard: None,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Enable the commit guard.
    pub fn with_guard(mut self, guard: CircuitBreaker) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn policies(&self) -> &PolicyRegistry {
        &self.policies
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    async fn key_lock(&self, key: &SourceKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Forget the key's lock once no other cycle holds or awaits it.
    async fn release_key_lock(&self, key: &SourceKey, lock: Arc<Mutex<()>>) {
        drop(lock);
        let mut locks = self.locks.lock().await;
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }

    /// Run one cycle over freshly observed raw records.
    ///
    /// Fails only when the key's category has no policy. Every other problem
    /// (bad records, unreadable or unwritable snapshot) ends up as a warning
    /// on an otherwise valid report.
    pub async fn run_cycle(&self, key: &SourceKey, records: &[Value]) -> Result<CycleReport> {
        let policy = self.policies.get(key.category())?;

        let lock = self.key_lock(key).await;
        let report = {
            let _guard = lock.lock().await;
            self.locked_cycle(key, policy.as_ref(), records).await
        };
        self.release_key_lock(key, lock).await;
        Ok(report)
    }

    async fn locked_cycle(
        &self,
        key: &SourceKey,
        policy: &dyn EntityPolicy,
        records: &[Value],
    ) -> CycleReport {
        let started_at = Utc::now();
        log::info!("Cycle {}: {} raw records", key, records.len());

        let mut warnings = Vec::new();

        let batch = normalize_all(records, policy);
        for (index, error) in &batch.skipped {
            log::warn!("Cycle {}: skipping record #{}: {}", key, index, error);
            warnings.push(CycleWarning::RecordSkipped {
                index: *index,
                reason: error.to_string(),
            });
        }
        for (index, id, fields) in &batch.missing_keys {
            log::warn!(
                "Cycle {}: record #{} has empty key fields {:?} (id '{}')",
                key,
                index,
                fields,
                id
            );
            warnings.push(CycleWarning::MissingKeyFields {
                index: *index,
                id: id.clone(),
                fields: fields.clone(),
            });
        }
        for id in &batch.duplicates {
            log::warn!("Cycle {}: duplicate id '{}', keeping the later record", key, id);
            warnings.push(CycleWarning::DuplicateId { id: id.clone() });
        }

        let previous = match self.store.load(key).await {
            Ok(previous) => previous,
            Err(e) => {
                log::warn!("Cycle {}: snapshot unreadable, treating as absent: {}", key, e);
                warnings.push(CycleWarning::SnapshotUnreadable {
                    message: e.to_string(),
                });
                None
            }
        };

        let current = batch.collection;
        let result = DiffEngine::new(policy).diff(previous.as_ref(), &current);
        log::info!(
            "Cycle {}: {:?} ({} added, {} updated, {} removed)",
            key,
            result.status,
            result.added.len(),
            result.updated.len(),
            result.removed.len()
        );

        let committed = if result.requires_commit() {
            self.commit(key, previous.as_ref(), &current, &mut warnings)
                .await
        } else {
            false
        };

        CycleReport {
            source: key.source().to_string(),
            category: key.category().to_string(),
            result,
            skipped: batch.skipped.len(),
            duplicates: batch.duplicates.len(),
            committed,
            started_at,
            finished_at: Utc::now(),
            warnings,
        }
    }

    /// Run one cycle and hand back only the diff result.
    pub async fn diff_only(&self, key: &SourceKey, records: &[Value]) -> Result<DiffResult> {
        Ok(self.run_cycle(key, records).await?.result)
    }

    async fn commit(
        &self,
        key: &SourceKey,
        previous: Option<&Collection>,
        current: &Collection,
        warnings: &mut Vec<CycleWarning>,
    ) -> bool {
        if let (Some(guard), Some(previous)) = (&self.guard, previous) {
            if let Err(e) = guard.validate(current.len(), previous.len()) {
                warnings.push(CycleWarning::CommitWithheld {
                    message: e.to_string(),
                });
                return false;
            }
        }

        match self.store.commit(key, current).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("Cycle {}: commit failed: {}", key, e);
                warnings.push(CycleWarning::CommitFailed {
                    message: e.to_string(),
                });
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{DiffStatus, GuardConfig};
    use crate::storage::LocalStorage;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    fn coordinator(tmp: &TempDir) -> RunCoordinator {
        RunCoordinator::new(
            Arc::new(LocalStorage::new(tmp.path())),
            PolicyRegistry::with_builtins(),
        )
    }

    fn position(title: &str, location: &str, description: &str) -> Value {
        json!({
            "title": title,
            "location": location,
            "compensation": "$150K – $200K",
            "description": description,
        })
    }

    /// Store whose reads succeed but whose writes always fail.
    struct ReadOnlyStore {
        inner: LocalStorage,
    }

    #[async_trait]
    impl SnapshotStore for ReadOnlyStore {
        async fn load(&self, key: &SourceKey) -> Result<Option<Collection>> {
            self.inner.load(key).await
        }

        async fn commit(&self, key: &SourceKey, _collection: &Collection) -> Result<()> {
            Err(AppError::storage(key.to_string(), "read-only file system"))
        }

        async fn keys(&self) -> Result<Vec<SourceKey>> {
            self.inner.keys().await
        }
    }

    /// Store whose reads fail with an I/O error.
    struct UnreachableStore;

    #[async_trait]
    impl SnapshotStore for UnreachableStore {
        async fn load(&self, _key: &SourceKey) -> Result<Option<Collection>> {
            Err(AppError::Io(std::io::Error::other("connection reset")))
        }

        async fn commit(&self, _key: &SourceKey, _collection: &Collection) -> Result<()> {
            Ok(())
        }

        async fn keys(&self) -> Result<Vec<SourceKey>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_first_cycle_initializes_and_commits() {
        let tmp = TempDir::new().unwrap();
        let coordinator = coordinator(&tmp);
        let key = SourceKey::new("dyna", "position").unwrap();

        let report = coordinator
            .run_cycle(&key, &[position("SWE", "Remote", "Write code.")])
            .await
            .unwrap();

        assert_eq!(report.result.status, DiffStatus::Initialized);
        assert_eq!(report.result.added.len(), 1);
        assert!(report.committed);
        assert!(tmp.path().join("dyna/position.json").exists());
    }

    #[tokio::test]
    async fn test_unchanged_cycle_does_not_touch_snapshot() {
        let tmp = TempDir::new().unwrap();
        let coordinator = coordinator(&tmp);
        let key = SourceKey::new("dyna", "position").unwrap();
        let records = vec![position("SWE", "Remote", "Write code.")];

        coordinator.run_cycle(&key, &records).await.unwrap();
        let path = tmp.path().join("dyna/position.json");
        let before = std::fs::read(&path).unwrap();
        let modified = std::fs::metadata(&path).unwrap().modified().unwrap();

        let report = coordinator.run_cycle(&key, &records).await.unwrap();
        assert_eq!(report.result.status, DiffStatus::Checked);
        assert!(!report.committed);
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), modified);
    }

    #[tokio::test]
    async fn test_description_change_is_reported() {
        let tmp = TempDir::new().unwrap();
        let coordinator = coordinator(&tmp);
        let key = SourceKey::new("dyna", "position").unwrap();

        coordinator
            .run_cycle(&key, &[position("SWE", "Remote", "Write code.")])
            .await
            .unwrap();
        let report = coordinator
            .run_cycle(&key, &[position("SWE", "Remote", "Write Rust.")])
            .await
            .unwrap();

        assert_eq!(report.result.status, DiffStatus::Updated);
        let change = &report.result.updated[0];
        assert_eq!(change.id, "swe__remote");
        assert_eq!(change.display["compensation"], "$150K – $200K");
        assert_eq!(change.before.as_deref(), Some("Write code."));
        assert_eq!(change.after.as_deref(), Some("Write Rust."));
        assert!(report.committed);
    }

    #[tokio::test]
    async fn test_bad_records_are_skipped_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let coordinator = coordinator(&tmp);
        let key = SourceKey::new("dyna", "position").unwrap();

        let report = coordinator
            .run_cycle(
                &key,
                &[
                    json!(17),
                    position("SWE", "Remote", "x"),
                    json!({"title": {"nested": true}}),
                ],
            )
            .await
            .unwrap();

        assert_eq!(report.skipped, 2);
        assert_eq!(report.result.added.len(), 1);
        assert!(matches!(
            report.warnings[0],
            CycleWarning::RecordSkipped { index: 0, .. }
        ));
    }

    #[tokio::test]
    async fn test_commit_failure_keeps_result() {
        let tmp = TempDir::new().unwrap();
        let coordinator = RunCoordinator::new(
            Arc::new(ReadOnlyStore {
                inner: LocalStorage::new(tmp.path()),
            }),
            PolicyRegistry::with_builtins(),
        );
        let key = SourceKey::new("pi", "member").unwrap();

        let report = coordinator
            .run_cycle(&key, &[json!("Ada"), json!("Grace")])
            .await
            .unwrap();

        assert_eq!(report.result.status, DiffStatus::Initialized);
        assert_eq!(report.result.added.len(), 2);
        assert!(!report.committed);
        assert!(matches!(
            report.storage_warnings().next(),
            Some(CycleWarning::CommitFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreadable_snapshot_is_absent() {
        let coordinator =
            RunCoordinator::new(Arc::new(UnreachableStore), PolicyRegistry::with_builtins());
        let key = SourceKey::new("pi", "member").unwrap();

        let report = coordinator.run_cycle(&key, &[json!("Ada")]).await.unwrap();
        assert_eq!(report.result.status, DiffStatus::Initialized);
        assert!(report.committed);
        assert!(matches!(
            report.warnings[0],
            CycleWarning::SnapshotUnreadable { .. }
        ));
    }

    #[tokio::test]
    async fn test_unknown_category_fails() {
        let tmp = TempDir::new().unwrap();
        let coordinator = coordinator(&tmp);
        let key = SourceKey::new("pi", "paper").unwrap();

        let err = coordinator.run_cycle(&key, &[]).await.unwrap_err();
        assert!(matches!(err, AppError::UnknownCategory(_)));
    }

    #[tokio::test]
    async fn test_guard_withholds_commit_but_reports_removals() {
        let tmp = TempDir::new().unwrap();
        let guard = CircuitBreaker::with_config(GuardConfig {
            enabled: true,
            min_baseline: 2,
            ..GuardConfig::default()
        });
        let coordinator = coordinator(&tmp).with_guard(guard);
        let key = SourceKey::new("pi", "member").unwrap();

        coordinator
            .run_cycle(&key, &[json!("Ada"), json!("Grace"), json!("Alan")])
            .await
            .unwrap();
        let report = coordinator.run_cycle(&key, &[]).await.unwrap();

        assert_eq!(report.result.removed.len(), 3);
        assert!(!report.committed);
        assert!(matches!(
            report.warnings[0],
            CycleWarning::CommitWithheld { .. }
        ));

        let stored = LocalStorage::new(tmp.path()).load(&key).await.unwrap().unwrap();
        assert_eq!(stored.len(), 3);
    }

    #[tokio::test]
    async fn test_same_key_cycles_are_serialized() {
        let tmp = TempDir::new().unwrap();
        let coordinator = Arc::new(coordinator(&tmp));
        let key = SourceKey::new("pi", "member").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let coordinator = Arc::clone(&coordinator);
                let key = key.clone();
                tokio::spawn(async move {
                    coordinator
                        .run_cycle(&key, &[json!("Ada"), json!(format!("Member {i}"))])
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut initialized = 0;
        for handle in handles {
            if handle.await.unwrap().result.status == DiffStatus::Initialized {
                initialized += 1;
            }
        }
        assert_eq!(initialized, 1);

        let stored = LocalStorage::new(tmp.path()).load(&key).await.unwrap().unwrap();
        assert!(stored.contains("ada"));
        assert_eq!(stored.len(), 2);
        assert!(coordinator.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_key_locks_are_released_after_cycles() {
        let tmp = TempDir::new().unwrap();
        let coordinator = coordinator(&tmp);

        for source in ["acme", "dyna", "pi", "skild_ai"] {
            let key = SourceKey::new(source, "member").unwrap();
            coordinator.run_cycle(&key, &[json!("Ada")]).await.unwrap();
        }

        assert!(coordinator.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_diff_only_returns_result_and_commits() {
        let tmp = TempDir::new().unwrap();
        let coordinator = coordinator(&tmp);
        let key = SourceKey::new("pi", "member").unwrap();

        coordinator
            .diff_only(&key, &[json!("Ada"), json!("Grace")])
            .await
            .unwrap();
        let result = coordinator
            .diff_only(&key, &[json!("Ada"), json!("Alan")])
            .await
            .unwrap();

        assert_eq!(result.status, DiffStatus::Updated);
        let added: Vec<&str> = result.added.iter().map(|e| e.id.as_str()).collect();
        let removed: Vec<&str> = result.removed.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(added, vec!["alan"]);
        assert_eq!(removed, vec!["grace"]);
    }
}
