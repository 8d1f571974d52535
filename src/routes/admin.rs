use crate::{
    AppState, handlers,
    permissions::{
        self, CREATE_USER, DELETE_USER, RequiredPermissions, UPDATE_USER, VIEW_LIST_ROLE,
        VIEW_LIST_USER, VIEW_USER,
    },
};
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
};

/// Admin Router Module
///
/// User and role management, nested under `/admin`. Each route registers its own
/// permission gate; the gate runs after token verification and before the
/// handler. Methods sharing a path are registered separately so each can carry a
/// different requirement.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/users
        .route(
            "/users",
            get(handlers::list_users).route_layer(from_fn_with_state(
                RequiredPermissions::new(&[VIEW_LIST_USER]),
                permissions::gate,
            )),
        )
        // POST /admin/users
        .route(
            "/users",
            post(handlers::create_user).route_layer(from_fn_with_state(
                RequiredPermissions::new(&[CREATE_USER]),
                permissions::gate,
            )),
        )
        // GET /admin/users/{id}
        .route(
            "/users/{id}",
            get(handlers::get_user).route_layer(from_fn_with_state(
                RequiredPermissions::new(&[VIEW_USER]),
                permissions::gate,
            )),
        )
        // PUT /admin/users/{id}
        .route(
            "/users/{id}",
            put(handlers::update_user).route_layer(from_fn_with_state(
                RequiredPermissions::new(&[UPDATE_USER]),
                permissions::gate,
            )),
        )
        // DELETE /admin/users/{id}
        .route(
            "/users/{id}",
            delete(handlers::delete_user).route_layer(from_fn_with_state(
                RequiredPermissions::new(&[DELETE_USER]),
                permissions::gate,
            )),
        )
        // GET /admin/roles
        .route(
            "/roles",
            get(handlers::list_roles).route_layer(from_fn_with_state(
                RequiredPermissions::new(&[VIEW_LIST_ROLE]),
                permissions::gate,
            )),
        )
}
