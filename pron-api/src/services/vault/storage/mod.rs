//! Blob storage for encrypted recordings
//!
//! Every store hands out opaque locator strings whose prefix identifies the
//! store that wrote them. [`StorageRouter`] uploads to the active store and
//! sends downloads and deletes to whichever registered store claims the
//! locator, so locators stay readable after the active backend changes.

pub mod azure_blob;
pub mod local;

pub use azure_blob::AzureBlobStore;
pub use local::LocalBlobStore;

use async_trait::async_trait;
use pron_common::Settings;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("No storage backend handles locator: {0}")]
    UnsupportedLocator(String),

    #[error("Blob service returned {0}: {1}")]
    Remote(u16, String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage configuration error: {0}")]
    Config(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Whether `locator` was produced by this store
    fn handles(&self, locator: &str) -> bool;

    /// Store `data` under a fresh unique name and return its locator
    async fn upload(
        &self,
        data: &[u8],
        extension: &str,
        owner: Option<&str>,
    ) -> Result<String, StorageError>;

    async fn download(&self, locator: &str) -> Result<Vec<u8>, StorageError>;

    /// `Ok(false)` when nothing was stored at `locator`
    async fn delete(&self, locator: &str) -> Result<bool, StorageError>;
}

/// Owner ids become path segments; keep them to a safe character set
pub(crate) fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".repeat(cleaned.len().max(1))
    } else {
        cleaned
    }
}

/// Active store for uploads plus every store able to resolve locators
pub struct StorageRouter {
    active: Arc<dyn BlobStore>,
    stores: Vec<Arc<dyn BlobStore>>,
}

impl StorageRouter {
    pub fn new(active: Arc<dyn BlobStore>) -> Self {
        Self {
            stores: vec![active.clone()],
            active,
        }
    }

    /// Register an additional read/delete backend
    pub fn with_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.stores.push(store);
        self
    }

    /// Mock mode stores locally; live mode stores in Azure and still resolves
    /// `local://` locators written earlier
    pub async fn from_settings(settings: &Settings) -> Result<Self, StorageError> {
        let local: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(&settings.mock_blob_dir));

        if settings.mock_mode {
            info!(root = %settings.mock_blob_dir.display(), "Using local blob storage");
            return Ok(Self::new(local));
        }

        let connection_string = settings.blob_connection_string.as_deref().ok_or_else(|| {
            StorageError::Config("BLOB_CONNECTION_STRING is required in live mode".to_string())
        })?;
        let azure = AzureBlobStore::from_connection_string(
            connection_string,
            &settings.blob_container_name,
        )?;
        azure.ensure_container().await?;

        info!(container = %settings.blob_container_name, "Using Azure blob storage");
        Ok(Self::new(Arc::new(azure)).with_store(local))
    }

    pub fn active_name(&self) -> &'static str {
        self.active.name()
    }

    fn store_for(&self, locator: &str) -> Result<&Arc<dyn BlobStore>, StorageError> {
        self.stores
            .iter()
            .find(|store| store.handles(locator))
            .ok_or_else(|| StorageError::UnsupportedLocator(locator.to_string()))
    }

    pub async fn upload(
        &self,
        data: &[u8],
        extension: &str,
        owner: Option<&str>,
    ) -> Result<String, StorageError> {
        self.active.upload(data, extension, owner).await
    }

    pub async fn download(&self, locator: &str) -> Result<Vec<u8>, StorageError> {
        self.store_for(locator)?.download(locator).await
    }

    pub async fn delete(&self, locator: &str) -> Result<bool, StorageError> {
        self.store_for(locator)?.delete(locator).await
    }

    /// Delete blobs whose rows are already gone; failures are logged only
    pub async fn delete_best_effort(&self, locators: &[String]) -> usize {
        let mut removed = 0;
        for locator in locators {
            match self.delete(locator).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(locator = %locator, "Failed to delete orphaned blob: {}", e),
            }
        }
        removed
    }
}
