//! Router construction.

use std::path::Path;

use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Static router over the display tree, falling back to the staging tree
/// for assets referenced from staged pages (copied images, fragments).
pub(crate) fn create_router(display_dir: &Path, build_dir: &Path) -> Router {
    let staged = ServeDir::new(build_dir);
    let display = ServeDir::new(display_dir).fallback(staged);
    Router::new()
        .fallback_service(display)
        .layer(TraceLayer::new_for_http())
}
