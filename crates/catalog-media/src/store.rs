use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::MediaError;

/// Object storage capability: persist `bytes` under `key`, return its URL.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// # Errors
    ///
    /// Returns [`MediaError`] if the object cannot be written.
    async fn put(&self, bytes: &[u8], key: &str) -> Result<String, MediaError>;
}

/// Filesystem-backed [`ObjectStore`].
///
/// Objects land at `{root}/{key}` and are served under
/// `{public_url}/{key}`. Writes go to a temporary sibling first and are
/// renamed into place, so a reader never sees a half-written file. Putting
/// an existing key overwrites it with identical content (keys are content
/// fingerprints).
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    public_url: String,
}

impl LocalObjectStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, public_url: &str) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.trim_end_matches('/').to_owned(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, MediaError> {
        let relative = Path::new(key);
        let escapes = relative.components().any(|c| {
            !matches!(c, std::path::Component::Normal(_))
        });
        if key.is_empty() || escapes {
            return Err(MediaError::Storage(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("object key \"{key}\" is not a relative path"),
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, bytes: &[u8], key: &str) -> Result<String, MediaError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::debug!(key, size = bytes.len(), "stored object");
        Ok(format!("{}/{key}", self.public_url))
    }
}
