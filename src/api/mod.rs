/// API routes and handlers
pub mod account;
pub mod documents;
pub mod extract;
pub mod files;
pub mod health;
pub mod verify;

use crate::{context::AppContext, metrics};
use axum::{http::header, response::IntoResponse, routing::get, Router};

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(verify::routes())
        .merge(account::routes())
        .merge(documents::routes())
        .merge(files::routes())
        .merge(health::routes())
        .route("/metrics", get(metrics_handler))
}

/// Prometheus text exposition
async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}
