/// Document records
///
/// A document is a stored file plus the metadata the dashboard shows. Owners
/// have full control; users who linked the owner's account may read.

mod manager;

pub use manager::DocumentManager;

use crate::db::models::{Category, Document};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An uploaded file as received from the client
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub data: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
}

/// Fields for a new document
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub file: FileUpload,
    /// Display name; defaults to the filename without extension
    pub name: Option<String>,
    pub category: Option<Category>,
}

/// Changes to an existing document
#[derive(Debug, Clone, Default)]
pub struct DocumentUpdate {
    pub name: Option<String>,
    pub category: Option<Category>,
    /// Replacement file
    pub file: Option<FileUpload>,
}

/// Document as sent to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    pub id: String,
    #[serde(rename = "userId")]
    pub owner_phone: String,
    pub name: String,
    pub original_name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub file_type: String,
    /// Display label such as `12.3KB`
    pub size: String,
    pub size_bytes: i64,
    pub category: Category,
    pub created_at: DateTime<Utc>,
}

impl From<Document> for DocumentView {
    fn from(doc: Document) -> Self {
        let size = doc.size_label();
        Self {
            id: doc.id,
            owner_phone: doc.owner_phone,
            name: doc.name,
            original_name: doc.original_name,
            url: doc.url,
            file_type: doc.file_type,
            size,
            size_bytes: doc.size_bytes,
            category: doc.category,
            created_at: doc.created_at,
        }
    }
}

/// Document list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentList {
    pub documents: Vec<DocumentView>,
}
