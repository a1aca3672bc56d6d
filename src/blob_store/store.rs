/// Blob store front
///
/// Wraps the configured backend with upload size checks.
use crate::{
    blob_store::{BlobBackend, BlobUpload, CloudinaryBackend, DiskBlobBackend, StoredBlob},
    config::{BlobstoreConfig, ServerConfig},
    error::{PocketError, PocketResult},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct BlobStore {
    backend: Arc<dyn BlobBackend>,
    max_blob_size: usize,
}

impl BlobStore {
    pub fn new(backend: Arc<dyn BlobBackend>, max_blob_size: usize) -> Self {
        Self {
            backend,
            max_blob_size,
        }
    }

    /// Build the backend named by the configuration
    pub async fn from_config(config: &ServerConfig, http: reqwest::Client) -> PocketResult<Self> {
        let backend: Arc<dyn BlobBackend> = match &config.storage.blobstore {
            BlobstoreConfig::Disk { location } => {
                tokio::fs::create_dir_all(location).await?;
                tracing::info!("Using disk blob storage at {:?}", location);
                Arc::new(DiskBlobBackend::new(
                    location.clone(),
                    &config.service.public_url,
                ))
            }
            BlobstoreConfig::Cloudinary {
                cloud_name,
                upload_preset,
            } => {
                tracing::info!("Using Cloudinary blob storage (cloud {})", cloud_name);
                Arc::new(CloudinaryBackend::new(http, cloud_name, upload_preset))
            }
        };

        Ok(Self::new(backend, config.service.upload_limit))
    }

    pub fn max_blob_size(&self) -> usize {
        self.max_blob_size
    }

    /// Upload a file
    pub async fn upload(&self, upload: BlobUpload) -> PocketResult<StoredBlob> {
        if upload.data.is_empty() {
            return Err(PocketError::Validation("Please select a file".to_string()));
        }

        if upload.data.len() > self.max_blob_size {
            return Err(PocketError::Validation(format!(
                "File is too large (maximum {} MB)",
                self.max_blob_size / (1024 * 1024)
            )));
        }

        self.backend.put(upload).await
    }

    /// Read a blob served by this process
    pub async fn get(&self, key: &str) -> PocketResult<Option<Vec<u8>>> {
        self.backend.get(key).await
    }

    /// Remove a blob, logging rather than failing
    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.backend.delete(key).await {
            tracing::warn!(key, "Failed to delete blob: {}", e);
        }
    }
}
