// Route table for the Sandcheck API

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

// room for JSON escaping and the other request fields around `code`
const BODY_OVERHEAD_BYTES: usize = 16 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.engine.config().max_source_bytes * 2 + BODY_OVERHEAD_BYTES;

    Router::new()
        .route("/verify", post(handlers::verify_submission))
        .route("/challenges", get(handlers::list_challenges))
        .route("/challenges/:challenge_id", get(handlers::get_challenge))
        .route("/status", get(handlers::health_check))
        .route("/metrics", get(handlers::export_metrics))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
