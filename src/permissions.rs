//! Permission codes and the route-level permission gate.
//!
//! Routes declare the codes they need when they are registered:
//!
//! ```ignore
//! .route(
//!     "/users",
//!     post(handlers::create_user)
//!         .route_layer(from_fn_with_state(RequiredPermissions::new(&[CREATE_USER]), gate)),
//! )
//! ```
//!
//! The gate runs after `auth::authenticate` and only reads the claims it left behind.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{auth::Claims, error::AppError};

pub const VIEW_LIST_USER: &str = "view_list_user";
pub const VIEW_USER: &str = "view_user";
pub const CREATE_USER: &str = "create_user";
pub const UPDATE_USER: &str = "update_user";
pub const DELETE_USER: &str = "delete_user";
pub const VIEW_LIST_ROLE: &str = "view_list_role";

/// Every code the portal knows about, in display order.
pub const ALL: &[&str] = &[
    VIEW_LIST_USER,
    VIEW_USER,
    CREATE_USER,
    UPDATE_USER,
    DELETE_USER,
    VIEW_LIST_ROLE,
];

/// RequiredPermissions
///
/// The fixed set of codes a route demands. Built once at route registration.
#[derive(Debug, Clone, Copy)]
pub struct RequiredPermissions(&'static [&'static str]);

impl RequiredPermissions {
    pub const fn new(codes: &'static [&'static str]) -> Self {
        Self(codes)
    }

    pub fn codes(&self) -> &'static [&'static str] {
        self.0
    }

    /// Codes from this set that `claims` does not carry.
    pub fn missing(&self, claims: &Claims) -> Vec<&'static str> {
        self.0
            .iter()
            .copied()
            .filter(|code| !claims.has_permission(code))
            .collect()
    }

    /// Allows iff every required code is present in the claims.
    pub fn check(&self, claims: Option<&Claims>) -> Result<(), AppError> {
        let claims = claims.ok_or(AppError::NotAuthenticated)?;
        let missing = self.missing(claims);
        if missing.is_empty() {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %claims.id,
                role = %claims.role,
                missing = ?missing,
                "permission denied"
            );
            Err(AppError::InsufficientPermissions)
        }
    }
}

/// gate
///
/// Middleware form of `RequiredPermissions::check`.
pub async fn gate(
    State(required): State<RequiredPermissions>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    required.check(request.extensions().get::<Claims>())?;
    Ok(next.run(request).await)
}
