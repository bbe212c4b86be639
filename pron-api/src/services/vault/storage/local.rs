//! Local-filesystem blob store
//!
//! Files live under `<root>/<owner>/<uuid>.<ext>` and are addressed by
//! `local://<path>` locators.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use super::{sanitize_segment, BlobStore, StorageError};

pub const LOCAL_SCHEME: &str = "local://";

pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, locator: &str) -> Result<PathBuf, StorageError> {
        locator
            .strip_prefix(LOCAL_SCHEME)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| StorageError::UnsupportedLocator(locator.to_string()))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn name(&self) -> &'static str {
        "local"
    }

    fn handles(&self, locator: &str) -> bool {
        locator.starts_with(LOCAL_SCHEME)
    }

    async fn upload(
        &self,
        data: &[u8],
        extension: &str,
        owner: Option<&str>,
    ) -> Result<String, StorageError> {
        let filename = format!("{}.{}", Uuid::new_v4(), sanitize_segment(extension));
        let dir = match owner {
            Some(owner) => self.root.join(sanitize_segment(owner)),
            None => self.root.clone(),
        };

        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(filename);
        tokio::fs::write(&path, data).await?;

        info!(bytes = data.len(), path = %path.display(), "Stored blob locally");
        Ok(format!("{}{}", LOCAL_SCHEME, path.to_string_lossy()))
    }

    async fn download(&self, locator: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(locator)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(locator.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, locator: &str) -> Result<bool, StorageError> {
        let path = self.path_for(locator)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "Removed local blob");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "Local blob already absent");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let locator = store.upload(b"abc", "wav", Some("user/../1")).await.unwrap();
        assert!(locator.starts_with(LOCAL_SCHEME));
        assert!(locator.ends_with(".wav"));

        let path = PathBuf::from(locator.strip_prefix(LOCAL_SCHEME).unwrap());
        assert_eq!(path.parent().unwrap(), dir.path().join("user_.._1"));
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_upload_without_owner_goes_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let locator = store.upload(b"", "wav", None).await.unwrap();
        let path = PathBuf::from(locator.strip_prefix(LOCAL_SCHEME).unwrap());
        assert_eq!(path.parent().unwrap(), dir.path());
        assert_eq!(store.download(&locator).await.unwrap(), b"");
    }

    #[tokio::test]
    async fn test_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let a = store.upload(b"1", "wav", Some("u")).await.unwrap();
        let b = store.upload(b"1", "wav", Some("u")).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_delete_missing_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let locator = store.upload(b"x", "wav", Some("u")).await.unwrap();
        assert!(store.delete(&locator).await.unwrap());
        assert!(!store.delete(&locator).await.unwrap());

        assert!(matches!(
            store.download(&locator).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
