//! Change-detection pipeline.
//!
//! - `normalize`: Raw records → keyed, fingerprinted entities
//! - `diff`: Previous vs. current collection → added / removed / updated
//! - `cycle`: One load → diff → commit cycle per (source, category)
//! - `runner`: Many cycles at once, grouped by source

pub mod circuit_breaker;
pub mod cycle;
pub mod diff;
pub mod normalize;
pub mod policy;
pub mod runner;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerResult};
pub use cycle::RunCoordinator;
pub use diff::{DiffEngine, calculate_diff};
pub use normalize::{Normalized, NormalizedBatch, fingerprint, normalize, normalize_all};
pub use policy::{EntityPolicy, FieldPolicy, Identity, PolicyRegistry};
pub use runner::{
    BatchManifest, BatchReport, CycleOutcome, CycleRequest, SourceReport, run_batch,
};
