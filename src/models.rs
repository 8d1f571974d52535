use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// A portal account as stored in the `users` table, minus its password hash.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    // Role name; permissions are resolved from `role_permissions`.
    pub role: String,
    // Public path of the profile photo, e.g. `/uploads/profile/profile-...png`.
    pub photo: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// UserCredentials
///
/// Internal row used only by the login flow. Never serialized.
#[derive(Debug, Clone, FromRow)]
pub struct UserCredentials {
    #[sqlx(flatten)]
    pub user: User,
    pub password_hash: String,
}

/// Role
///
/// A role and the permission codes it grants.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct Role {
    pub name: String,
    pub permissions: Vec<String>,
}

/// NewUser
///
/// Insert payload produced by the create handler after hashing the password.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: String,
    pub password_hash: String,
}

// --- Request Payloads (Input Schemas) ---

/// LoginRequest
///
/// Input payload for `POST /auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct LoginRequest {
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

/// CreateUserRequest
///
/// Input payload for `POST /admin/users`. The password is hashed before it
/// reaches the repository and is never logged.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1, message = "role is required"))]
    pub role: String,
}

/// UpdateUserRequest
///
/// Partial update payload for `PUT /admin/users/{id}`. Absent fields are left untouched.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(email(message = "email must be a valid address"))]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "role must not be empty"))]
    pub role: Option<String>,
}

// --- Response Schemas (Output) ---

/// LoginResponse
///
/// Bearer token plus the profile it was issued for.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    /// Unix seconds.
    pub expires_at: i64,
    pub user: UserProfile,
}

/// UserProfile
///
/// Output schema for the authenticated user (`GET /me`, login).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub photo: Option<String>,
    pub permissions: Vec<String>,
}

impl UserProfile {
    pub fn new<I>(user: User, permissions: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            photo: user.photo,
            permissions: permissions.into_iter().collect(),
        }
    }
}

/// UploadResponse
///
/// Result of a stored profile photo.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UploadResponse {
    /// Generated name on disk.
    pub filename: String,
    /// Public path the file is served from.
    pub url: String,
    pub original_filename: String,
    pub content_type: String,
    pub size: usize,
}
