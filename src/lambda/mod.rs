// src/lambda/mod.rs

//! AWS Lambda handler for the tracker.
//!
//! Each invocation carries a batch of observed records, runs one cycle per
//! (source, category) against snapshots stored in S3 and returns the batch
//! report.

use std::sync::Arc;

use lambda_runtime::{Error as LambdaError, LambdaEvent};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::{apply_env_overrides, build_coordinator};
use crate::error::Result;
use crate::models::Config;
use crate::pipeline::{BatchManifest, BatchReport, CycleRequest, run_batch};
use crate::storage::s3::S3Storage;

/// Lambda invocation payload.
#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    /// Cycles to run
    #[serde(default)]
    pub cycles: Vec<CycleRequest>,

    /// Only run these categories (all when empty)
    #[serde(default)]
    pub only: Vec<String>,
}

/// Lambda response payload.
#[derive(Debug, Default, Serialize)]
pub struct TrackResponse {
    /// Whether the batch ran; individual cycles may still have failed
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<BatchReport>,

    /// Error message if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

/// Main Lambda handler function.
#[instrument(skip(event))]
pub async fn handler(
    event: LambdaEvent<TrackRequest>,
) -> std::result::Result<TrackResponse, LambdaError> {
    let start = std::time::Instant::now();
    let (request, _context) = event.into_parts();

    info!(
        "Starting batch: {} cycles, only={:?}",
        request.cycles.len(),
        request.only
    );

    match run_track(request).await {
        Ok(report) => {
            let execution_time_ms = start.elapsed().as_millis() as u64;
            info!(
                "Batch completed: {} cycles, {} changed, {} failed in {}ms",
                report.total, report.changed, report.failed, execution_time_ms
            );
            Ok(TrackResponse {
                success: true,
                report: Some(report),
                error: None,
                execution_time_ms,
            })
        }
        Err(e) => {
            error!("Batch failed: {}", e);
            Ok(TrackResponse {
                success: false,
                error: Some(e.to_string()),
                execution_time_ms: start.elapsed().as_millis() as u64,
                ..Default::default()
            })
        }
    }
}

async fn run_track(request: TrackRequest) -> Result<BatchReport> {
    let storage = S3Storage::from_env().await?;

    let mut config = Config::default();
    apply_env_overrides(&mut config);
    config.validate()?;

    let coordinator = build_coordinator(&config, Arc::new(storage));

    let mut manifest = BatchManifest {
        cycles: request.cycles,
    };
    manifest.retain_categories(&request.only);

    Ok(run_batch(&coordinator, manifest.cycles, config.runner.max_concurrent).await)
}
