//! Uploads written under a local directory and served by the static file layer.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{ObjectStorage, StoreError};

pub struct DiskStorage {
    root: PathBuf,
    public_base: String,
}

impl DiskStorage {
    pub fn new(root: PathBuf, public_base: &str) -> Self {
        Self {
            root,
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        if !is_safe_path(path) {
            return Err(StoreError::InvalidQuery(format!("invalid object path '{}'", path)));
        }
        Ok(self.root.join(path))
    }
}

/// Relative, slash-separated, and free of traversal segments.
fn is_safe_path(path: &str) -> bool {
    !path.is_empty()
        && !path.contains('\\')
        && !path.contains('\0')
        && path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

#[async_trait]
impl ObjectStorage for DiskStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, StoreError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                tracing::error!("Failed to create upload directory: {}", e);
                StoreError::Transport(e.to_string())
            })?;
        }

        tokio::fs::write(&target, &bytes).await.map_err(|e| {
            tracing::error!(path = %target.display(), "Failed to write upload: {}", e);
            StoreError::Transport(e.to_string())
        })?;

        tracing::info!(path = %path, size = bytes.len(), "Object stored on disk");
        Ok(path.to_string())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base, path)
    }
}
