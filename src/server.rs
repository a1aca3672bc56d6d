/// HTTP server setup and routing
use crate::{
    context::AppContext,
    error::{PocketError, PocketResult},
    metrics,
    rate_limit::rate_limit_middleware,
};
use axum::{
    extract::{DefaultBodyLimit, MatchedPath, Request},
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::{Json, Response},
    Router,
};
use serde_json::json;
use std::time::Instant;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Room for multipart framing and text fields around the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the main application router
/// Returns Router<()> because state is already provided
pub fn build_router(ctx: AppContext) -> Router {
    // Create CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let body_limit = ctx.document_manager.blobs().max_blob_size() + MULTIPART_OVERHEAD;

    Router::new()
        .merge(crate::api::routes())
        // Matched routes only, so metric labels stay bounded
        .route_layer(middleware::from_fn(track_http_metrics))
        // Provide state - converts Router<AppContext> to Router<()>
        .with_state(ctx.clone())
        // Apply rate limiting middleware (after state so it can access AppContext)
        .layer(middleware::from_fn_with_state(ctx, rate_limit_middleware))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .fallback(not_found)
}

/// Record request count and latency per route template
async fn track_http_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let response = next.run(request).await;

    metrics::record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// Start the HTTP server
pub async fn serve(ctx: AppContext) -> PocketResult<()> {
    let addr = format!("{}:{}", ctx.config.service.hostname, ctx.config.service.port);

    info!("CloudPocket listening on {}", addr);
    info!("   Service URL: {}", ctx.service_url());

    let app = build_router(ctx);

    // Create TCP listener
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| PocketError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| PocketError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
