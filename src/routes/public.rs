use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a token.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe. Returns "ok" without touching the database.
        .route("/health", get(|| async { "ok" }))
        // POST /sign-up
        // Creates an account and returns a token for it.
        .route("/sign-up", post(handlers::sign_up))
        // POST /sign-in
        .route("/sign-in", post(handlers::sign_in))
}
