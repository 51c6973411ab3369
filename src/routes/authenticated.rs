use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, patch, post},
};

/// Authenticated Router Module
///
/// Every route here sits behind `auth_middleware`, so handlers can take `AuthUser`
/// knowing it is already resolved. Group routes additionally run their permission
/// policy inside the handler, after the group has been loaded.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        .route("/me", get(handlers::get_me))
        // --- Groups ---
        // GET/POST /groups
        // Listing accepts an optional `?status=open|closed` filter.
        .route(
            "/groups",
            get(handlers::list_groups).post(handlers::create_group),
        )
        // GET/PATCH /groups/{id}
        // PATCH is owner-only and only while the group is open.
        .route(
            "/groups/{id}",
            get(handlers::retrieve_group).patch(handlers::update_group),
        )
        // PATCH /groups/{id}/password
        // Sets or clears the join password. Owner-only.
        .route(
            "/groups/{id}/password",
            patch(handlers::update_group_password),
        )
        // POST /groups/{id}/close
        .route("/groups/{id}/close", post(handlers::close_group))
        // --- Membership ---
        // POST /groups/{id}/join
        // Private groups expect `{"password": "..."}` in the body.
        .route("/groups/{id}/join", post(handlers::join_group))
        // POST /groups/{id}/leave
        .route("/groups/{id}/leave", post(handlers::leave_group))
        // POST /groups/{id}/kick
        // Owner removes `{"user_id": N}` from the group.
        .route("/groups/{id}/kick", post(handlers::kick_from_group))
}
