use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.intake.max_upload_size + MULTIPART_OVERHEAD;

    let mut router = Router::new()
        // Files
        .route("/files", get(handlers::list_files))
        .route(
            "/files",
            post(handlers::create_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/files/*key",
            get(handlers::get_file).delete(handlers::delete_file),
        )
        .route("/content/*key", get(handlers::download_file))
        .route("/exists/*key", get(handlers::file_exists))
        .route("/signed-url/*key", get(handlers::signed_url))
        // Internal
        .route("/_internal/health", get(handlers::health));

    // Signed-URL target for the local provider
    if state.url_verifier.is_some() {
        router = router.route("/static/*key", get(handlers::serve_static));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
