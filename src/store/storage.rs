/// Object storage for row attachments
///
/// The hosted bucket is an external collaborator. [`LocalObjectStorage`]
/// keeps the same `upload` / `public_url` contract on the local filesystem.
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::error::{PlannerError, PlannerResult, StoreError};

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores `bytes` under `bucket/path` and returns the stored path.
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> PlannerResult<String>;

    /// Public URL for a path previously returned by [`ObjectStorage::upload`].
    fn public_url(&self, bucket: &str, stored_path: &str) -> String;
}

/// Writes objects under `root/<bucket>/<path>`.
#[derive(Debug, Clone)]
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn resolve(&self, bucket: &str, path: &str) -> PlannerResult<PathBuf> {
        let relative = Path::new(bucket).join(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || path.is_empty() {
            return Err(PlannerError::validation(
                "path",
                format!("invalid object path '{bucket}/{path}'"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> PlannerResult<String> {
        let target = self.resolve(bucket, path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StoreError::from)?;
        }
        tokio::fs::write(&target, &bytes)
            .await
            .map_err(StoreError::from)?;
        debug!(bucket, path, size = bytes.len(), "Stored attachment");
        Ok(path.to_string())
    }

    fn public_url(&self, bucket: &str, stored_path: &str) -> String {
        format!("{}/{}/{}", self.public_base_url, bucket, stored_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_writes_under_bucket() {
        let dir = TempDir::new().unwrap();
        let storage = LocalObjectStorage::new(dir.path(), "http://files.local/");

        let stored = storage
            .upload("ppmp-attachments", "ppmp-1/100-0.pdf", b"%PDF".to_vec())
            .await
            .unwrap();

        assert_eq!(stored, "ppmp-1/100-0.pdf");
        let on_disk = dir.path().join("ppmp-attachments/ppmp-1/100-0.pdf");
        assert_eq!(std::fs::read(on_disk).unwrap(), b"%PDF");
        assert_eq!(
            storage.public_url("ppmp-attachments", &stored),
            "http://files.local/ppmp-attachments/ppmp-1/100-0.pdf"
        );
    }

    #[tokio::test]
    async fn test_upload_rejects_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let storage = LocalObjectStorage::new(dir.path(), "http://files.local");
        let err = storage
            .upload("ppmp-attachments", "../escape.txt", vec![])
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }
}
