//! AWS S3 storage implementation.
//!
//! Snapshots are stored at `{bucket}/{prefix}/{source}/{category}.json`.
//! A single `PutObject` replaces an object atomically, so readers never see a
//! partially written snapshot.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::{AppError, Result};
use crate::models::{Collection, SourceKey};
use crate::storage::{SnapshotStore, decode_snapshot, encode_snapshot};

/// S3-based snapshot storage.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Storage {
    /// Create a new S3 storage instance.
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    /// Create S3 storage from environment configuration.
    pub async fn from_env() -> Result<Self> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = Client::new(&config);

        let bucket = std::env::var("S3_BUCKET")
            .map_err(|_| AppError::config("S3_BUCKET is not set"))?;
        let prefix = std::env::var("S3_PREFIX").unwrap_or_else(|_| "snapshots".to_string());

        Ok(Self::new(client, bucket, prefix))
    }

    /// Object key for a snapshot.
    fn object_key(&self, key: &SourceKey) -> String {
        if self.prefix.is_empty() {
            key.storage_path()
        } else {
            format!("{}/{}", self.prefix, key.storage_path())
        }
    }

    /// Read an object, returning None if it does not exist.
    async fn read_bytes(&self, object_key: &str) -> Result<Option<Vec<u8>>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(object_key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| AppError::S3(e.to_string()))?;
                Ok(Some(bytes.into_bytes().to_vec()))
            }
            Err(err) => {
                // Check if it's a "not found" error
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    log::debug!("No snapshot at s3://{}/{}", self.bucket, object_key);
                    Ok(None)
                } else {
                    Err(AppError::S3(service_err.to_string()))
                }
            }
        }
    }

    /// All object keys under the storage prefix.
    async fn list_objects(&self) -> Result<Vec<String>> {
        let mut object_keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket);
            if !self.prefix.is_empty() {
                request = request.prefix(format!("{}/", self.prefix));
            }
            if let Some(token) = continuation.take() {
                request = request.continuation_token(token);
            }

            let output = request
                .send()
                .await
                .map_err(|e| AppError::S3(e.into_service_error().to_string()))?;

            object_keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(object_keys)
    }

    /// Map an object key back to a snapshot key.
    fn parse_object_key(&self, object_key: &str) -> Option<SourceKey> {
        let relative = if self.prefix.is_empty() {
            object_key
        } else {
            object_key.strip_prefix(&self.prefix)?.strip_prefix('/')?
        };
        let (source, file) = relative.split_once('/')?;
        let category = file.strip_suffix(".json")?;
        SourceKey::new(source, category).ok()
    }
}

#[async_trait]
impl SnapshotStore for S3Storage {
    async fn load(&self, key: &SourceKey) -> Result<Option<Collection>> {
        let object_key = self.object_key(key);
        Ok(self
            .read_bytes(&object_key)
            .await?
            .and_then(|bytes| decode_snapshot(key, &bytes)))
    }

    async fn commit(&self, key: &SourceKey, collection: &Collection) -> Result<()> {
        let object_key = self.object_key(key);
        let body = ByteStream::from(encode_snapshot(collection)?);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(body)
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| AppError::storage(key.to_string(), e.into_service_error()))?;

        log::info!(
            "Snapshot: {} entities written to s3://{}/{}",
            collection.len(),
            self.bucket,
            object_key
        );
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<SourceKey>> {
        let mut keys: Vec<SourceKey> = self
            .list_objects()
            .await?
            .iter()
            .filter_map(|object_key| self.parse_object_key(object_key))
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(prefix: &str) -> S3Storage {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .build();
        S3Storage::new(Client::from_conf(config), "bucket", prefix)
    }

    #[test]
    fn test_object_key_layout() {
        let key = SourceKey::new("dyna", "position").unwrap();
        assert_eq!(storage("/snapshots/").object_key(&key), "snapshots/dyna/position.json");
        assert_eq!(storage("").object_key(&key), "dyna/position.json");
    }

    #[test]
    fn test_parse_object_key() {
        let s3 = storage("snapshots");
        assert_eq!(
            s3.parse_object_key("snapshots/dyna/post.json"),
            Some(SourceKey::new("dyna", "post").unwrap())
        );
        assert_eq!(s3.parse_object_key("snapshots/dyna/post.txt"), None);
        assert_eq!(s3.parse_object_key("other/dyna/post.json"), None);
        assert_eq!(s3.parse_object_key("snapshots/dyna/nested/post.json"), None);
    }
}
