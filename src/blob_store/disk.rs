/// Disk-based blob storage backend
use crate::{
    blob_store::{resource_type_for, split_filename, BlobBackend, BlobUpload, StoredBlob},
    error::{PocketError, PocketResult},
};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use uuid::Uuid;

/// Disk storage backend
///
/// Stores blobs on the local filesystem with directory sharding
/// based on key prefixes to prevent too many files in one directory.
#[derive(Clone)]
pub struct DiskBlobBackend {
    base_path: PathBuf,
    /// Base URL files are served from, e.g. `https://pocket.example/files`
    public_base: String,
}

impl DiskBlobBackend {
    /// Create a new disk storage backend
    pub fn new(base_path: PathBuf, public_url: &str) -> Self {
        Self {
            base_path,
            public_base: format!("{}/files", public_url.trim_end_matches('/')),
        }
    }

    /// Keys are generated here, so anything else is rejected before it
    /// reaches the filesystem.
    fn validate_key(key: &str) -> PocketResult<()> {
        let valid = !key.is_empty()
            && key.len() <= 64
            && !key.starts_with('.')
            && !key.contains("..")
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');

        if valid {
            Ok(())
        } else {
            Err(PocketError::NotFound("File not found".to_string()))
        }
    }

    /// Get the file path for a key
    ///
    /// Uses directory sharding: {base}/{first2chars}/{key}
    fn get_blob_path(&self, key: &str) -> PathBuf {
        if key.len() >= 2 {
            let shard = &key[0..2];
            self.base_path.join(shard).join(key)
        } else {
            self.base_path.join("_").join(key)
        }
    }

    /// Ensure the directory for a blob exists
    async fn ensure_blob_dir(&self, key: &str) -> PocketResult<PathBuf> {
        let blob_path = self.get_blob_path(key);
        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                PocketError::BlobStorage(format!("Failed to create blob directory: {}", e))
            })?;
        }
        Ok(blob_path)
    }
}

#[async_trait]
impl BlobBackend for DiskBlobBackend {
    async fn put(&self, upload: BlobUpload) -> PocketResult<StoredBlob> {
        let (stem, ext) = split_filename(&upload.filename);
        let original_name = stem.to_string();
        let resource_type = resource_type_for(&upload.mime_type).to_string();

        let id = Uuid::new_v4().simple().to_string();
        let key = match &ext {
            Some(ext) if ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
                format!("{}.{}", id, ext)
            }
            _ => id,
        };

        let size = upload.data.len() as i64;
        let blob_path = self.ensure_blob_dir(&key).await?;

        fs::write(&blob_path, upload.data).await.map_err(|e| {
            PocketError::BlobStorage(format!("Failed to write blob {}: {}", key, e))
        })?;

        tracing::debug!(key = %key, size, "Stored blob on disk");

        Ok(StoredBlob {
            url: format!("{}/{}", self.public_base, key),
            format: ext.unwrap_or_else(|| resource_type.clone()),
            key,
            original_name,
            size,
            resource_type,
        })
    }

    async fn get(&self, key: &str) -> PocketResult<Option<Vec<u8>>> {
        Self::validate_key(key)?;
        let blob_path = self.get_blob_path(key);

        match fs::read(&blob_path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PocketError::BlobStorage(format!(
                "Failed to read blob {}: {}",
                key, e
            ))),
        }
    }

    async fn delete(&self, key: &str) -> PocketResult<()> {
        Self::validate_key(key)?;
        let blob_path = self.get_blob_path(key);

        match fs::remove_file(&blob_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PocketError::BlobStorage(format!(
                "Failed to delete blob {}: {}",
                key, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn upload(filename: &str, data: &[u8], mime: &str) -> BlobUpload {
        BlobUpload {
            data: data.to_vec(),
            filename: filename.to_string(),
            mime_type: mime.to_string(),
        }
    }

    #[tokio::test]
    async fn test_put_and_get_blob() {
        let dir = tempdir().unwrap();
        let backend = DiskBlobBackend::new(dir.path().to_path_buf(), "http://localhost:8080/");

        let stored = backend
            .put(upload("PAN Card.pdf", b"%PDF-1.4 test", "application/pdf"))
            .await
            .unwrap();

        assert!(stored.key.ends_with(".pdf"));
        assert_eq!(stored.url, format!("http://localhost:8080/files/{}", stored.key));
        assert_eq!(stored.original_name, "PAN Card");
        assert_eq!(stored.format, "pdf");
        assert_eq!(stored.size, 13);
        assert_eq!(stored.resource_type, "image");

        let retrieved = backend.get(&stored.key).await.unwrap();
        assert_eq!(retrieved, Some(b"%PDF-1.4 test".to_vec()));
    }

    #[tokio::test]
    async fn test_same_content_gets_distinct_keys() {
        let dir = tempdir().unwrap();
        let backend = DiskBlobBackend::new(dir.path().to_path_buf(), "http://localhost");

        let a = backend.put(upload("a.txt", b"same", "text/plain")).await.unwrap();
        let b = backend.put(upload("a.txt", b"same", "text/plain")).await.unwrap();
        assert_ne!(a.key, b.key);

        backend.delete(&a.key).await.unwrap();
        assert!(backend.get(&b.key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_get_nonexistent_blob() {
        let dir = tempdir().unwrap();
        let backend = DiskBlobBackend::new(dir.path().to_path_buf(), "http://localhost");

        let result = backend.get("0123456789abcdef.pdf").await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_delete_blob() {
        let dir = tempdir().unwrap();
        let backend = DiskBlobBackend::new(dir.path().to_path_buf(), "http://localhost");

        let stored = backend
            .put(upload("notes", b"to be deleted", "text/plain"))
            .await
            .unwrap();
        assert_eq!(stored.format, "raw");

        backend.delete(&stored.key).await.unwrap();
        assert_eq!(backend.get(&stored.key).await.unwrap(), None);

        // Deleting twice is fine
        backend.delete(&stored.key).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let dir = tempdir().unwrap();
        let backend = DiskBlobBackend::new(dir.path().to_path_buf(), "http://localhost");

        assert!(backend.get("../etc/passwd").await.is_err());
        assert!(backend.get("ab/../../x").await.is_err());
        assert!(backend.delete(".hidden").await.is_err());
    }

    #[test]
    fn test_directory_sharding() {
        let backend = DiskBlobBackend::new(PathBuf::from("/data/blobs"), "http://localhost");
        let path = backend.get_blob_path("9f86d081884c7d65.pdf");

        // Should be in a subdirectory based on first 2 chars
        assert!(path.to_string_lossy().contains("/9f/"));
    }
}
