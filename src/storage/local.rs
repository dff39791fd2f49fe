//! Local filesystem storage implementation.
//!
//! Snapshots live under `{root}/{source}/{category}.json`. Commits write a
//! sibling temporary file and rename it into place, so a reader only ever
//! sees a complete snapshot.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{Collection, SourceKey};
use crate::storage::{SnapshotStore, decode_snapshot, encode_snapshot};

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a key's snapshot.
    pub fn path(&self, key: &SourceKey) -> PathBuf {
        self.root_dir.join(key.source()).join(format!("{}.json", key.category()))
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.ensure_dir(path).await?;

        let tmp = path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AppError::Io(e));
        }
        Ok(())
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Names of the directory entries under `dir` that satisfy `keep`.
    async fn entries(
        dir: &Path,
        keep: impl Fn(&std::fs::FileType, &str) -> bool,
    ) -> Result<Vec<String>> {
        let mut reader = match tokio::fs::read_dir(dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let file_type = entry.file_type().await?;
            if let Some(name) = entry.file_name().to_str() {
                if keep(&file_type, name) {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl SnapshotStore for LocalStorage {
    async fn load(&self, key: &SourceKey) -> Result<Option<Collection>> {
        let path = self.path(key);
        match self.read_bytes(&path).await? {
            Some(bytes) => Ok(decode_snapshot(key, &bytes)),
            None => {
                log::debug!("No snapshot at {}", path.display());
                Ok(None)
            }
        }
    }

    async fn commit(&self, key: &SourceKey, collection: &Collection) -> Result<()> {
        let path = self.path(key);
        let bytes = encode_snapshot(collection)?;
        self.write_bytes(&path, &bytes)
            .await
            .map_err(|e| AppError::storage(key.to_string(), e))?;
        log::info!(
            "Snapshot: {} entities written to {}",
            collection.len(),
            path.display()
        );
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<SourceKey>> {
        let sources = Self::entries(&self.root_dir, |ft, _| ft.is_dir()).await?;

        let mut keys = Vec::new();
        for source in sources {
            let files = Self::entries(&self.root_dir.join(&source), |ft, name| {
                ft.is_file() && name.ends_with(".json")
            })
            .await?;
            for file in files {
                let Some(category) = file.strip_suffix(".json") else {
                    continue;
                };
                if let Ok(key) = SourceKey::new(source.clone(), category) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Entity;
    use tempfile::TempDir;

    fn key(source: &str, category: &str) -> SourceKey {
        SourceKey::new(source, category).unwrap()
    }

    fn sample() -> Collection {
        [
            Entity::new("robot-engineer-remote", "h1").with_attr("title", "Robot Engineer"),
            Entity::new("ml-researcher-sf", "h2").with_attr("title", "ML Researcher"),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn test_commit_and_load() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let key = key("dyna", "position");

        storage.commit(&key, &sample()).await.unwrap();
        let loaded = storage.load(&key).await.unwrap();
        assert_eq!(loaded, Some(sample()));
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let loaded = storage.load(&key("dyna", "post")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_absent() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let key = key("dyna", "position");

        let path = storage.path(&key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"[{\"id\": \"trunc").unwrap();

        assert!(storage.load(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let key = key("skild_ai", "post");

        storage.commit(&key, &sample()).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(tmp.path().join("skild_ai"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["post.json"]);
    }

    #[tokio::test]
    async fn test_commit_overwrites_previous() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let key = key("dyna", "position");

        storage.commit(&key, &sample()).await.unwrap();
        storage.commit(&key, &Collection::new()).await.unwrap();

        assert_eq!(storage.load(&key).await.unwrap(), Some(Collection::new()));
    }

    #[tokio::test]
    async fn test_keys_are_isolated_and_listed() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.commit(&key("dyna", "position"), &sample()).await.unwrap();
        storage.commit(&key("dyna", "post"), &Collection::new()).await.unwrap();
        storage.commit(&key("acme", "member"), &Collection::new()).await.unwrap();
        std::fs::write(tmp.path().join("dyna").join("notes.txt"), b"x").unwrap();

        let keys = storage.keys().await.unwrap();
        let names: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(names, vec!["acme/member", "dyna/position", "dyna/post"]);

        assert_eq!(
            storage.load(&key("dyna", "position")).await.unwrap(),
            Some(sample())
        );
    }

    #[tokio::test]
    async fn test_keys_keep_dotted_category_names() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let key = key("acme", "feed.json");

        storage.commit(&key, &sample()).await.unwrap();

        assert_eq!(storage.keys().await.unwrap(), vec![key.clone()]);
        assert_eq!(storage.load(&key).await.unwrap(), Some(sample()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_readers_never_see_partial_snapshot() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let key = key("dyna", "position");

        let large = |tag: &str| -> Collection {
            (0..2000)
                .map(|i| {
                    Entity::new(format!("position-{i}"), format!("{tag}-{i}"))
                        .with_attr("title", format!("Position {i} ({tag})"))
                        .with_attr("description", "Build and ship robots. ".repeat(20))
                })
                .collect()
        };
        let old = large("old");
        let new = large("new");
        storage.commit(&key, &old).await.unwrap();

        let writer = {
            let storage = storage.clone();
            let key = key.clone();
            let (old, new) = (old.clone(), new.clone());
            tokio::spawn(async move {
                for round in 0..20 {
                    let next = if round % 2 == 0 { &new } else { &old };
                    storage.commit(&key, next).await.unwrap();
                }
            })
        };

        let mut loads = 0;
        while !writer.is_finished() || loads < 20 {
            let loaded = storage.load(&key).await.unwrap();
            match loaded {
                Some(collection) => assert!(collection == old || collection == new),
                None => panic!("snapshot disappeared during commit"),
            }
            loads += 1;
        }
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_keys_on_missing_root() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path().join("nope"));
        assert!(storage.keys().await.unwrap().is_empty());
    }
}
