/// Blob Storage System
///
/// Holds the uploaded document files. Two backends exist: sharded files on
/// local disk (served by this process under `/files/`) and Cloudinary.

pub mod cloudinary;
pub mod disk;
pub mod store;

pub use cloudinary::CloudinaryBackend;
pub use disk::DiskBlobBackend;
pub use store::BlobStore;

use crate::error::PocketResult;
use async_trait::async_trait;

/// A file to be stored
#[derive(Debug, Clone)]
pub struct BlobUpload {
    pub data: Vec<u8>,
    /// Client-supplied filename, already sanitised
    pub filename: String,
    pub mime_type: String,
}

/// Where and how a blob ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Backend key used for later retrieval or deletion
    pub key: String,
    /// Publicly reachable URL
    pub url: String,
    /// Filename without extension
    pub original_name: String,
    /// Lowercase extension, or the resource type when there is none
    pub format: String,
    pub size: i64,
    /// `image`, `video` or `raw`
    pub resource_type: String,
}

/// Blob storage backend trait
///
/// Implementations handle the actual storage and retrieval of blob data.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Store a blob
    async fn put(&self, upload: BlobUpload) -> PocketResult<StoredBlob>;

    /// Retrieve a blob by key
    ///
    /// Backends that serve files themselves return `None`.
    async fn get(&self, _key: &str) -> PocketResult<Option<Vec<u8>>> {
        Ok(None)
    }

    /// Delete a blob by key
    async fn delete(&self, key: &str) -> PocketResult<()>;
}

/// Coarse resource class in the form Cloudinary reports it
pub fn resource_type_for(mime_type: &str) -> &'static str {
    if mime_type.starts_with("image/") || mime_type == "application/pdf" {
        "image"
    } else if mime_type.starts_with("video/") || mime_type.starts_with("audio/") {
        "video"
    } else {
        "raw"
    }
}

/// Split a filename into stem and lowercase extension
pub fn split_filename(filename: &str) -> (&str, Option<String>) {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            (stem, Some(ext.to_ascii_lowercase()))
        }
        _ => (filename, None),
    }
}

/// Content type to serve for a stored key
pub fn mime_for_key(key: &str) -> &'static str {
    let ext = split_filename(key).1.unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "mp4" => "video/mp4",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_filename() {
        assert_eq!(split_filename("aadhaar.PDF"), ("aadhaar", Some("pdf".to_string())));
        assert_eq!(split_filename("archive.tar.gz"), ("archive.tar", Some("gz".to_string())));
        assert_eq!(split_filename("README"), ("README", None));
        assert_eq!(split_filename(".env"), (".env", None));
    }

    #[test]
    fn test_resource_type() {
        assert_eq!(resource_type_for("image/png"), "image");
        assert_eq!(resource_type_for("application/pdf"), "image");
        assert_eq!(resource_type_for("video/mp4"), "video");
        assert_eq!(resource_type_for("application/zip"), "raw");
    }

    #[test]
    fn test_mime_for_key() {
        assert_eq!(mime_for_key("ab12.pdf"), "application/pdf");
        assert_eq!(mime_for_key("ab12.JPG"), "image/jpeg");
        assert_eq!(mime_for_key("ab12"), "application/octet-stream");
    }
}
