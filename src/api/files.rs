/// Stored file serving for the disk backend
use crate::{
    blob_store::mime_for_key,
    context::AppContext,
    error::{PocketError, PocketResult},
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

/// Keys are random and never reused, so the content never changes
const IMMUTABLE: &str = "public, max-age=31536000, immutable";

/// Build file routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/files/:key", get(get_file))
}

/// Get a stored file by key
///
/// Serves content with Content-Type, caching headers, and Range request support
async fn get_file(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> PocketResult<Response> {
    let data = ctx
        .document_manager
        .blobs()
        .get(&key)
        .await?
        .ok_or_else(|| PocketError::NotFound("File not found".to_string()))?;

    let mime_type = mime_for_key(&key);
    let total_size = data.len();
    let etag = format!("\"{}\"", key);

    // Check If-None-Match header for 304 Not Modified
    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH) {
        if let Ok(if_none_match_str) = if_none_match.to_str() {
            if if_none_match_str == etag {
                return Ok((
                    StatusCode::NOT_MODIFIED,
                    [(header::ETAG, etag), (header::CACHE_CONTROL, IMMUTABLE.to_string())],
                )
                    .into_response());
            }
        }
    }

    // Check for Range header
    if let Some(range_str) = headers.get(header::RANGE).and_then(|h| h.to_str().ok()) {
        if let Some((start, end)) = parse_range(range_str, total_size) {
            let partial_data = data[start..=end].to_vec();

            return Ok((
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_TYPE, mime_type.to_string()),
                    (
                        header::CONTENT_RANGE,
                        format!("bytes {}-{}/{}", start, end, total_size),
                    ),
                    (header::ETAG, etag),
                    (header::CACHE_CONTROL, IMMUTABLE.to_string()),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                ],
                Body::from(partial_data),
            )
                .into_response());
        }
    }

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime_type.to_string()),
            (header::ETAG, etag),
            (header::CACHE_CONTROL, IMMUTABLE.to_string()),
            (header::ACCEPT_RANGES, "bytes".to_string()),
        ],
        Body::from(data),
    )
        .into_response())
}

/// Parse HTTP Range header
///
/// Returns (start, end) inclusive byte positions, or None if invalid
fn parse_range(range_header: &str, total_size: usize) -> Option<(usize, usize)> {
    // Expected format: "bytes=start-end" or "bytes=start-" or "bytes=-suffix"
    let range_spec = range_header.trim().strip_prefix("bytes=")?;
    if total_size == 0 {
        return None;
    }

    let (start_str, end_str) = range_spec.split_once('-')?;

    if start_str.is_empty() {
        // Suffix range: "bytes=-500" (last 500 bytes)
        let suffix = end_str.parse::<usize>().ok().filter(|s| *s > 0)?;
        let start = total_size.saturating_sub(suffix);
        return Some((start, total_size - 1));
    }

    let start = start_str.parse::<usize>().ok()?;
    if start >= total_size {
        return None;
    }

    if end_str.is_empty() {
        // Open-ended range: "bytes=500-" (from 500 to end)
        return Some((start, total_size - 1));
    }

    // Complete range, end clamped to the last byte
    let end = end_str.parse::<usize>().ok()?.min(total_size - 1);
    (start <= end).then_some((start, end))
}
