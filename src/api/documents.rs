/// Document endpoints
///
/// Uploads arrive as `multipart/form-data` with a `file` part and optional
/// `name` and `category` text parts.
use crate::{
    auth::AuthContext,
    context::AppContext,
    db::models::Category,
    documents::{DocumentList, DocumentUpdate, DocumentView, FileUpload, NewDocument},
    error::{PocketError, PocketResult},
};
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Build document routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/documents", get(list_documents).post(create_document))
        .route(
            "/api/documents/:id",
            get(get_document)
                .patch(update_document)
                .delete(delete_document),
        )
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    /// Phone of a linked account whose documents to list
    owner: Option<String>,
    category: Option<String>,
}

/// Parsed multipart form
#[derive(Debug, Default)]
struct DocumentForm {
    file: Option<FileUpload>,
    name: Option<String>,
    category: Option<Category>,
}

fn multipart_error(e: MultipartError) -> PocketError {
    PocketError::Validation(format!("Invalid upload: {}", e.body_text()))
}

async fn read_form(mut multipart: Multipart) -> PocketResult<DocumentForm> {
    let mut form = DocumentForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name().unwrap_or_default() {
            "file" => {
                let filename = field.file_name().unwrap_or("document").to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(multipart_error)?.to_vec();
                form.file = Some(FileUpload {
                    data,
                    filename,
                    mime_type,
                });
            }
            "name" => {
                let name = field.text().await.map_err(multipart_error)?;
                form.name = Some(name).filter(|n| !n.trim().is_empty());
            }
            "category" => {
                let raw = field.text().await.map_err(multipart_error)?;
                if !raw.is_empty() {
                    let category = raw
                        .parse::<Category>()
                        .map_err(|e| PocketError::Validation(e.to_string()))?;
                    form.category = Some(category);
                }
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown upload field");
            }
        }
    }

    Ok(form)
}

async fn list_documents(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(query): Query<ListQuery>,
) -> PocketResult<Json<DocumentList>> {
    let owner = query
        .owner
        .as_deref()
        .filter(|o| !o.trim().is_empty())
        .map(|o| ctx.user_manager.format_phone(o))
        .transpose()?;

    let documents = ctx
        .document_manager
        .list(&auth.phone, owner.as_deref(), query.category.as_deref())
        .await?
        .into_iter()
        .map(DocumentView::from)
        .collect();

    Ok(Json(DocumentList { documents }))
}

async fn create_document(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    multipart: Multipart,
) -> PocketResult<(StatusCode, Json<DocumentView>)> {
    let form = read_form(multipart).await?;
    let file = form
        .file
        .ok_or_else(|| PocketError::Validation("Please select a file".to_string()))?;

    let doc = ctx
        .document_manager
        .create(
            &auth.phone,
            NewDocument {
                file,
                name: form.name,
                category: form.category,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(doc.into())))
}

async fn get_document(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> PocketResult<Json<DocumentView>> {
    let doc = ctx.document_manager.get(&auth.phone, &id).await?;
    Ok(Json(doc.into()))
}

async fn update_document(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    multipart: Multipart,
) -> PocketResult<Json<DocumentView>> {
    let form = read_form(multipart).await?;

    let doc = ctx
        .document_manager
        .update(
            &auth.phone,
            &id,
            DocumentUpdate {
                name: form.name,
                category: form.category,
                file: form.file,
            },
        )
        .await?;

    Ok(Json(doc.into()))
}

async fn delete_document(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> PocketResult<Json<Value>> {
    ctx.document_manager.delete(&auth.phone, &id).await?;
    Ok(Json(json!({ "success": true })))
}
