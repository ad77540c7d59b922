/*
 * Responsibility
 * - v1 URL layout
 * - The publish gate wraps only the upload route
 */
use axum::{Router, extract::DefaultBodyLimit, routing::post};

use crate::api::v1::handlers::upload::upload;
use crate::middleware;
use crate::state::AppState;

pub const UPLOAD_ROUTE: &str = "/v1/tavern/upload";

pub fn routes(state: AppState) -> Router<AppState> {
    // Parts stream to disk; any body cap is the optional HTTP-layer limit.
    let publish = Router::new()
        .route("/tavern/upload", post(upload))
        .layer(DefaultBodyLimit::disable());

    middleware::auth::publisher::apply(publish, state)
}
