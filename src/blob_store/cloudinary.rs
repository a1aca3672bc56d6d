/// Cloudinary blob storage backend
///
/// Uploads through an unsigned upload preset. Without an API secret the
/// stored assets cannot be removed, so deletes are logged and skipped.
use crate::{
    blob_store::{split_filename, BlobBackend, BlobUpload, StoredBlob},
    error::{PocketError, PocketResult},
};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

const DEFAULT_API_BASE: &str = "https://api.cloudinary.com";

#[derive(Clone)]
pub struct CloudinaryBackend {
    client: reqwest::Client,
    upload_url: String,
    upload_preset: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
    #[serde(default)]
    original_filename: Option<String>,
    #[serde(default)]
    format: Option<String>,
    bytes: i64,
    resource_type: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl CloudinaryBackend {
    pub fn new(client: reqwest::Client, cloud_name: &str, upload_preset: &str) -> Self {
        Self::with_api_base(client, DEFAULT_API_BASE, cloud_name, upload_preset)
    }

    /// Point the backend at a different API host
    pub fn with_api_base(
        client: reqwest::Client,
        api_base: &str,
        cloud_name: &str,
        upload_preset: &str,
    ) -> Self {
        Self {
            client,
            upload_url: format!(
                "{}/v1_1/{}/auto/upload",
                api_base.trim_end_matches('/'),
                cloud_name
            ),
            upload_preset: upload_preset.to_string(),
        }
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }
}

fn into_stored(response: UploadResponse, filename: &str) -> StoredBlob {
    let (stem, ext) = split_filename(filename);

    StoredBlob {
        key: response.public_id,
        url: response.secure_url,
        original_name: response
            .original_filename
            .unwrap_or_else(|| stem.to_string()),
        // Raw uploads come back without a format
        format: response
            .format
            .filter(|f| !f.is_empty())
            .or(ext)
            .unwrap_or_else(|| response.resource_type.clone()),
        size: response.bytes,
        resource_type: response.resource_type,
    }
}

#[async_trait]
impl BlobBackend for CloudinaryBackend {
    async fn put(&self, upload: BlobUpload) -> PocketResult<StoredBlob> {
        let part = Part::bytes(upload.data)
            .file_name(upload.filename.clone())
            .mime_str(&upload.mime_type)
            .map_err(|e| PocketError::Validation(format!("Invalid file type: {}", e)))?;

        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.upload_preset.clone());

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PocketError::BlobStorage(format!("Upload request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorEnvelope>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|_| status.to_string());
            tracing::error!(%status, "Cloudinary upload failed: {}", message);
            return Err(PocketError::BlobStorage(format!("Upload failed: {}", message)));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| PocketError::BlobStorage(format!("Invalid upload response: {}", e)))?;

        tracing::debug!(public_id = %body.public_id, bytes = body.bytes, "Uploaded to Cloudinary");

        Ok(into_stored(body, &upload.filename))
    }

    async fn delete(&self, key: &str) -> PocketResult<()> {
        tracing::warn!(
            public_id = key,
            "Cloudinary assets cannot be deleted with an unsigned preset; skipping"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Multipart, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}", addr)
    }

    /// Accepts an unsigned upload and echoes what arrived
    async fn fake_upload(mut multipart: Multipart) -> (StatusCode, Json<Value>) {
        let mut preset = None;
        let mut file = None;
        while let Some(field) = multipart.next_field().await.unwrap() {
            match field.name().unwrap_or_default() {
                "upload_preset" => preset = Some(field.text().await.unwrap()),
                "file" => {
                    let name = field.file_name().unwrap_or_default().to_string();
                    let mime = field.content_type().unwrap_or_default().to_string();
                    file = Some((name, mime, field.bytes().await.unwrap().len()));
                }
                _ => {}
            }
        }

        match (preset.as_deref(), file) {
            (Some("pocket_unsigned"), Some((name, mime, len))) if mime == "application/pdf" => (
                StatusCode::OK,
                Json(json!({
                    "public_id": "pocket/abc123",
                    "secure_url": format!("https://res.example.com/{}", name),
                    "original_filename": name.trim_end_matches(".pdf"),
                    "format": "pdf",
                    "bytes": len,
                    "resource_type": "image"
                })),
            ),
            _ => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": { "message": "Upload preset not found" } })),
            ),
        }
    }

    fn pdf_upload() -> BlobUpload {
        BlobUpload {
            data: b"%PDF-1.4 marksheet".to_vec(),
            filename: "marksheet.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
        }
    }

    #[tokio::test]
    async fn test_put_sends_unsigned_multipart_upload() {
        let app = Router::new().route("/v1_1/demo/auto/upload", post(fake_upload));
        let base = spawn(app).await;

        let backend =
            CloudinaryBackend::with_api_base(reqwest::Client::new(), &base, "demo", "pocket_unsigned");
        let stored = backend.put(pdf_upload()).await.unwrap();

        assert_eq!(stored.key, "pocket/abc123");
        assert_eq!(stored.url, "https://res.example.com/marksheet.pdf");
        assert_eq!(stored.original_name, "marksheet");
        assert_eq!(stored.format, "pdf");
        assert_eq!(stored.size, 18);
        assert_eq!(stored.resource_type, "image");
    }

    #[tokio::test]
    async fn test_put_surfaces_provider_error() {
        let app = Router::new().route("/v1_1/demo/auto/upload", post(fake_upload));
        let base = spawn(app).await;

        let backend =
            CloudinaryBackend::with_api_base(reqwest::Client::new(), &base, "demo", "wrong");
        let err = backend.put(pdf_upload()).await.unwrap_err();

        assert!(matches!(err, PocketError::BlobStorage(_)));
        assert_eq!(
            err.to_string(),
            "Blob storage error: Upload failed: Upload preset not found"
        );
    }

    #[test]
    fn test_upload_url() {
        let backend = CloudinaryBackend::new(reqwest::Client::new(), "demo", "pocket_unsigned");
        assert_eq!(
            backend.upload_url(),
            "https://api.cloudinary.com/v1_1/demo/auto/upload"
        );
    }

    #[test]
    fn test_response_mapping() {
        let response: UploadResponse = serde_json::from_value(serde_json::json!({
            "public_id": "pocket/abc123",
            "secure_url": "https://res.cloudinary.com/demo/image/upload/v1/pocket/abc123.pdf",
            "original_filename": "marksheet",
            "format": "pdf",
            "bytes": 12595,
            "resource_type": "image"
        }))
        .unwrap();

        let stored = into_stored(response, "marksheet.pdf");
        assert_eq!(stored.key, "pocket/abc123");
        assert_eq!(stored.original_name, "marksheet");
        assert_eq!(stored.format, "pdf");
        assert_eq!(stored.size, 12595);
    }

    #[test]
    fn test_raw_upload_falls_back_to_extension() {
        let response: UploadResponse = serde_json::from_value(serde_json::json!({
            "public_id": "pocket/raw1.docx",
            "secure_url": "https://res.cloudinary.com/demo/raw/upload/v1/pocket/raw1.docx",
            "bytes": 2048,
            "resource_type": "raw"
        }))
        .unwrap();

        let stored = into_stored(response, "offer letter.docx");
        assert_eq!(stored.original_name, "offer letter");
        assert_eq!(stored.format, "docx");
    }

    #[tokio::test]
    async fn test_delete_is_skipped() {
        let backend = CloudinaryBackend::new(reqwest::Client::new(), "demo", "preset");
        backend.delete("pocket/abc123").await.unwrap();
    }
}
