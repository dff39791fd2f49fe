//! Storage abstractions for snapshot persistence.
//!
//! One snapshot per (source, category) key, stored as a pretty-printed JSON
//! array of entities so operators can read and diff the store directly.
//!
//! ## Layout
//!
//! ```text
//! {root}/
//! ├── dyna/
//! │   ├── post.json
//! │   └── position.json
//! └── skild_ai/
//!     └── position.json
//! ```

pub mod local;
#[cfg(feature = "s3")]
pub mod s3;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Collection, SourceKey};

// Re-export for convenience
pub use local::LocalStorage;

/// Trait for snapshot storage backends.
///
/// Each key is an independent storage unit, so commits to different keys
/// never interfere. Serializing cycles on the same key is the caller's job.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the last committed collection.
    ///
    /// `Ok(None)` when no snapshot exists or the stored data is malformed.
    /// `Err` only for I/O failures reaching the store.
    async fn load(&self, key: &SourceKey) -> Result<Option<Collection>>;

    /// Replace the snapshot atomically: readers see either the old or the
    /// new snapshot, never a partial one.
    async fn commit(&self, key: &SourceKey, collection: &Collection) -> Result<()>;

    /// Keys that currently have a snapshot, sorted.
    async fn keys(&self) -> Result<Vec<SourceKey>>;
}

/// Serialize a collection into the on-disk snapshot format.
pub fn encode_snapshot(collection: &Collection) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(collection)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Parse snapshot bytes, treating anything malformed as absent.
pub fn decode_snapshot(key: &SourceKey, bytes: &[u8]) -> Option<Collection> {
    match serde_json::from_slice::<Collection>(bytes) {
        Ok(collection) => Some(collection),
        Err(e) => {
            log::warn!("Snapshot for {} is malformed, treating as absent: {}", key, e);
            None
        }
    }
}
