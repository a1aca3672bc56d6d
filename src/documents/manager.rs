/// Document manager
use crate::{
    blob_store::{BlobStore, BlobUpload, StoredBlob},
    db::models::{Category, Document},
    documents::{DocumentUpdate, FileUpload, NewDocument},
    error::{PocketError, PocketResult},
    metrics,
    sanitize::{sanitize_filename, sanitize_string, strip_extension},
};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

const DOCUMENT_COLUMNS: &str = "id, owner_phone, name, original_name, url, storage_key, file_type, size_bytes, category, created_at";

pub struct DocumentManager {
    db: SqlitePool,
    blobs: BlobStore,
}

impl DocumentManager {
    pub fn new(db: SqlitePool, blobs: BlobStore) -> Self {
        Self { db, blobs }
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Whether `viewer` may read documents owned by `owner`
    pub async fn can_view(&self, viewer: &str, owner: &str) -> PocketResult<bool> {
        if viewer == owner {
            return Ok(true);
        }

        let linked: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM linked_accounts WHERE owner_phone = ?1 AND linked_phone = ?2",
        )
        .bind(viewer)
        .bind(owner)
        .fetch_optional(&self.db)
        .await?;

        Ok(linked.is_some())
    }

    /// Documents of `owner` (the viewer by default), newest first
    ///
    /// `category` of `None` or `"All"` lists every category.
    pub async fn list(
        &self,
        viewer: &str,
        owner: Option<&str>,
        category: Option<&str>,
    ) -> PocketResult<Vec<Document>> {
        let owner = owner.unwrap_or(viewer);
        if !self.can_view(viewer, owner).await? {
            return Err(PocketError::Authorization(
                "You do not have access to these documents".to_string(),
            ));
        }

        let category = match category.map(str::trim) {
            None | Some("") | Some("All") => None,
            Some(name) => Some(
                name.parse::<Category>()
                    .map_err(|e| PocketError::Validation(e.to_string()))?,
            ),
        };

        let documents = match category {
            Some(category) => {
                sqlx::query_as::<_, Document>(&format!(
                    "SELECT {} FROM documents WHERE owner_phone = ?1 AND category = ?2 ORDER BY created_at DESC",
                    DOCUMENT_COLUMNS
                ))
                .bind(owner)
                .bind(category.as_str())
                .fetch_all(&self.db)
                .await?
            }
            None => {
                sqlx::query_as::<_, Document>(&format!(
                    "SELECT {} FROM documents WHERE owner_phone = ?1 ORDER BY created_at DESC",
                    DOCUMENT_COLUMNS
                ))
                .bind(owner)
                .fetch_all(&self.db)
                .await?
            }
        };

        Ok(documents)
    }

    async fn find(&self, id: &str) -> PocketResult<Document> {
        sqlx::query_as::<_, Document>(&format!(
            "SELECT {} FROM documents WHERE id = ?1",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| PocketError::NotFound("Document not found".to_string()))
    }

    /// Fetch one document the viewer may read
    pub async fn get(&self, viewer: &str, id: &str) -> PocketResult<Document> {
        let doc = self.find(id).await?;
        if !self.can_view(viewer, &doc.owner_phone).await? {
            // Indistinguishable from a missing document
            return Err(PocketError::NotFound("Document not found".to_string()));
        }
        Ok(doc)
    }

    /// Fetch a document for modification by its owner
    async fn owned(&self, owner: &str, id: &str) -> PocketResult<Document> {
        let doc = self.get(owner, id).await?;
        if doc.owner_phone != owner {
            return Err(PocketError::Authorization(
                "Only the owner can change this document".to_string(),
            ));
        }
        Ok(doc)
    }

    async fn store_file(&self, file: FileUpload) -> PocketResult<StoredBlob> {
        let filename = sanitize_filename(&file.filename);
        let mime_type = if file.mime_type.trim().is_empty() {
            "application/octet-stream".to_string()
        } else {
            file.mime_type
        };

        self.blobs
            .upload(BlobUpload {
                data: file.data,
                filename,
                mime_type,
            })
            .await
    }

    /// Upload a file and record it
    pub async fn create(&self, owner: &str, new: NewDocument) -> PocketResult<Document> {
        let default_name = sanitize_filename(strip_extension(&new.file.filename));
        let name = new
            .name
            .as_deref()
            .map(sanitize_string)
            .filter(|n| !n.is_empty())
            .unwrap_or(default_name);
        let category = new.category.unwrap_or_default();

        let stored = self.store_file(new.file).await?;

        let doc = Document {
            id: Uuid::new_v4().to_string(),
            owner_phone: owner.to_string(),
            name,
            original_name: stored.original_name,
            url: stored.url,
            storage_key: stored.key,
            file_type: stored.format,
            size_bytes: stored.size,
            category,
            created_at: Utc::now(),
        };

        let inserted = sqlx::query(&format!(
            "INSERT INTO documents ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            DOCUMENT_COLUMNS
        ))
        .bind(&doc.id)
        .bind(&doc.owner_phone)
        .bind(&doc.name)
        .bind(&doc.original_name)
        .bind(&doc.url)
        .bind(&doc.storage_key)
        .bind(&doc.file_type)
        .bind(doc.size_bytes)
        .bind(doc.category.as_str())
        .bind(doc.created_at)
        .execute(&self.db)
        .await;

        if let Err(e) = inserted {
            self.blobs.remove(&doc.storage_key).await;
            return Err(e.into());
        }

        metrics::DOCUMENTS_UPLOADED.inc();
        tracing::info!(id = %doc.id, owner = %owner, size = doc.size_bytes, "Document created");

        Ok(doc)
    }

    /// Rename, recategorise, or replace the file of a document
    pub async fn update(
        &self,
        owner: &str,
        id: &str,
        update: DocumentUpdate,
    ) -> PocketResult<Document> {
        let mut doc = self.owned(owner, id).await?;

        if let Some(name) = update.name.as_deref().map(sanitize_string) {
            if !name.is_empty() {
                doc.name = name;
            }
        }
        if let Some(category) = update.category {
            doc.category = category;
        }

        let mut replaced_key = None;
        if let Some(file) = update.file {
            let stored = self.store_file(file).await?;
            replaced_key = Some(std::mem::replace(&mut doc.storage_key, stored.key));
            doc.url = stored.url;
            doc.original_name = stored.original_name;
            doc.file_type = stored.format;
            doc.size_bytes = stored.size;
            metrics::DOCUMENTS_UPLOADED.inc();
        }

        let updated = sqlx::query(
            r#"
            UPDATE documents
            SET name = ?1, category = ?2, url = ?3, original_name = ?4,
                file_type = ?5, size_bytes = ?6, storage_key = ?7
            WHERE id = ?8
            "#,
        )
        .bind(&doc.name)
        .bind(doc.category.as_str())
        .bind(&doc.url)
        .bind(&doc.original_name)
        .bind(&doc.file_type)
        .bind(doc.size_bytes)
        .bind(&doc.storage_key)
        .bind(&doc.id)
        .execute(&self.db)
        .await;

        if let Err(e) = updated {
            // The row still points at the old file; drop the new one
            if replaced_key.is_some() {
                self.blobs.remove(&doc.storage_key).await;
            }
            return Err(e.into());
        }

        if let Some(old_key) = replaced_key {
            self.blobs.remove(&old_key).await;
        }

        tracing::info!(id = %doc.id, "Document updated");
        Ok(doc)
    }

    /// Delete a document and, best-effort, its stored file
    pub async fn delete(&self, owner: &str, id: &str) -> PocketResult<()> {
        let doc = self.owned(owner, id).await?;

        sqlx::query("DELETE FROM documents WHERE id = ?1")
            .bind(&doc.id)
            .execute(&self.db)
            .await?;

        self.blobs.remove(&doc.storage_key).await;

        tracing::info!(id = %doc.id, "Document deleted");
        Ok(())
    }
}
