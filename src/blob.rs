//! Blob store seam - content-addressed replay log storage
//!
//! The ingestion core never manages connection strings or retry policy for
//! the content store; it talks to this trait and treats failures as opaque.
//! `FsBlobStore` backs local runs and tests with a directory tree
//! (`<root>/<scope>/<id>`).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Error type for blob-store operations
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Blob not found: {scope}/{id}")]
    NotFound { scope: String, id: String },
}

/// Where a stored blob ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLocation {
    pub scope: String,
    pub id: String,
}

/// Byte-level access to the content store, keyed by (scope, id).
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, scope: &str, id: &str) -> Result<bool, BlobError>;
    async fn get(&self, scope: &str, id: &str) -> Result<Vec<u8>, BlobError>;
    async fn put(&self, scope: &str, id: &str, bytes: &[u8]) -> Result<BlobLocation, BlobError>;
    /// Last-modified timestamp, when the backing store tracks one.
    async fn last_modified(&self, scope: &str, id: &str)
        -> Result<Option<DateTime<Utc>>, BlobError>;
}

/// Filesystem-backed blob store.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn blob_path(&self, scope: &str, id: &str) -> PathBuf {
        self.root.join(scope).join(id)
    }
}

fn modified_time(path: &Path) -> std::io::Result<Option<DateTime<Utc>>> {
    let metadata = std::fs::metadata(path)?;
    Ok(metadata.modified().ok().map(DateTime::<Utc>::from))
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn exists(&self, scope: &str, id: &str) -> Result<bool, BlobError> {
        Ok(tokio::fs::try_exists(self.blob_path(scope, id)).await?)
    }

    async fn get(&self, scope: &str, id: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.blob_path(scope, id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BlobError::NotFound {
                scope: scope.to_string(),
                id: id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, scope: &str, id: &str, bytes: &[u8]) -> Result<BlobLocation, BlobError> {
        let path = self.blob_path(scope, id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(BlobLocation {
            scope: scope.to_string(),
            id: id.to_string(),
        })
    }

    async fn last_modified(
        &self,
        scope: &str,
        id: &str,
    ) -> Result<Option<DateTime<Utc>>, BlobError> {
        let path = self.blob_path(scope, id);
        match modified_time(&path) {
            Ok(ts) => Ok(ts),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BlobError::NotFound {
                scope: scope.to_string(),
                id: id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_exists_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        assert!(!store.exists("replays", "123.json").await.unwrap());

        let location = store
            .put("replays", "123.json", b"{\"replay_id\":\"123\"}")
            .await
            .unwrap();
        assert_eq!(location.scope, "replays");
        assert_eq!(location.id, "123.json");

        assert!(store.exists("replays", "123.json").await.unwrap());
        let bytes = store.get("replays", "123.json").await.unwrap();
        assert_eq!(bytes, b"{\"replay_id\":\"123\"}");

        let modified = store.last_modified("replays", "123.json").await.unwrap();
        assert!(modified.is_some());
    }

    #[tokio::test]
    async fn get_missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let err = store.get("replays", "missing.json").await.unwrap_err();
        assert!(matches!(err, BlobError::NotFound { .. }));
    }
}
