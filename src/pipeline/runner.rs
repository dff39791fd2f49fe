//! Batch execution of many cycles.
//!
//! Runs cycles concurrently (bounded), keeps request order in the output and
//! groups outcomes by source. A failing cycle yields an error entry for that
//! (source, category) only; the rest of the batch still runs.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{CycleReport, SourceKey};
use crate::pipeline::cycle::RunCoordinator;

/// Raw records observed for one (source, category).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRequest {
    pub source: String,
    pub category: String,
    #[serde(default)]
    pub records: Vec<Value>,
}

/// A batch of cycle requests, as read from a manifest file or an event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchManifest {
    #[serde(default)]
    pub cycles: Vec<CycleRequest>,
}

impl BatchManifest {
    /// Keep only the requests for the given categories. Empty keeps all.
    pub fn retain_categories(&mut self, only: &[String]) {
        if only.is_empty() {
            return;
        }
        self.cycles.retain(|c| only.iter().any(|o| o == &c.category));
    }
}

/// Outcome of one requested cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CycleOutcome {
    Report(Box<CycleReport>),
    Failed { category: String, error: String },
}

impl CycleOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, CycleOutcome::Failed { .. })
    }
}

/// All outcomes for one source, in request order.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub cycles: Vec<CycleOutcome>,
}

/// Result of a whole batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub changed: usize,
    pub failed: usize,
    pub sources: Vec<SourceReport>,
}

/// Run every request, at most `max_concurrent` at a time.
pub async fn run_batch(
    coordinator: &RunCoordinator,
    requests: Vec<CycleRequest>,
    max_concurrent: usize,
) -> BatchReport {
    let mut outcomes: Vec<(usize, String, CycleOutcome)> = stream::iter(
        requests.into_iter().enumerate(),
    )
    .map(|(index, request)| async move {
        let outcome = run_one(coordinator, &request).await;
        (index, request.source, outcome)
    })
    .buffer_unordered(max_concurrent.max(1))
    .collect()
    .await;

    outcomes.sort_by_key(|(index, _, _)| *index);

    let mut report = BatchReport {
        total: outcomes.len(),
        ..BatchReport::default()
    };

    for (_, source, outcome) in outcomes {
        match &outcome {
            CycleOutcome::Failed { .. } => report.failed += 1,
            CycleOutcome::Report(cycle) if cycle.result.has_changes() => report.changed += 1,
            CycleOutcome::Report(_) => {}
        }

        match report.sources.iter_mut().find(|s| s.source == source) {
            Some(entry) => entry.cycles.push(outcome),
            None => report.sources.push(SourceReport {
                source,
                cycles: vec![outcome],
            }),
        }
    }

    log::info!(
        "Batch: {} cycles, {} with changes, {} failed",
        report.total,
        report.changed,
        report.failed
    );
    report
}

async fn run_one(coordinator: &RunCoordinator, request: &CycleRequest) -> CycleOutcome {
    let result = match SourceKey::new(request.source.as_str(), request.category.as_str()) {
        Ok(key) => coordinator.run_cycle(&key, &request.records).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(report) => CycleOutcome::Report(Box::new(report)),
        Err(e) => {
            log::error!(
                "Cycle {}/{} failed: {}",
                request.source,
                request.category,
                e
            );
            CycleOutcome::Failed {
                category: request.category.clone(),
                error: e.to_string(),
            }
        }
    }
}
