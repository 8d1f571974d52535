use crate::{AppState, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Routes available to any caller holding a valid token. `create_router` wraps
/// this tree with `auth::authenticate`, so every handler here can rely on the
/// `AuthUser` extractor.
///
/// `body_limit` caps the raw multipart body for the upload route. It is set above
/// the per-file limit so that the upload gate, not the framework, decides.
pub fn authenticated_routes(body_limit: usize) -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        // Profile of the current user plus the permissions carried by the token.
        .route("/me", get(handlers::get_me))
        // POST /me/photo
        // Multipart upload of a profile photo (field `photo`; jpeg, png or webp).
        .route(
            "/me/photo",
            post(handlers::upload_profile_photo).layer(DefaultBodyLimit::max(body_limit)),
        )
}
