use crate::{
    AppState,
    auth::AuthUser,
    error::AppError,
    models::{
        CreateUserRequest, LoginRequest, LoginResponse, NewUser, Role, UpdateUserRequest,
        UploadResponse, User, UserProfile,
    },
    password,
    upload::{self, PROFILE_PHOTO_FIELD, UploadPolicy},
};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use uuid::Uuid;
use validator::Validate;

/// Public path prefix stored files are served under.
const PROFILE_PHOTO_URL_PREFIX: &str = "/uploads/profile";

// --- Auth ---

/// login
///
/// [Public Route] Exchanges email + password for a bearer token. The token embeds
/// the permission codes of the user's role at issue time.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 400, description = "Malformed request"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    payload.validate()?;

    let Some(credentials) = state.repo.find_credentials(&payload.email).await? else {
        tracing::info!("login rejected: unknown email");
        return Err(AppError::InvalidCredentials);
    };

    if !password::verify_password(&payload.password, &credentials.password_hash)? {
        tracing::info!(user_id = %credentials.user.id, "login rejected: wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let user = credentials.user;
    let permissions = state.repo.permissions_for_role(&user.role).await?;
    let (token, claims) = state
        .issuer
        .issue(user.id, &user.role, permissions.iter().cloned())?;

    tracing::info!(user_id = %user.id, role = %user.role, "login succeeded");

    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer".to_string(),
        expires_at: claims.exp,
        user: UserProfile::new(user, claims.permissions),
    }))
}

// --- Authenticated ---

/// get_me
///
/// [Authenticated Route] Profile of the token's subject, with the permissions
/// carried by the token itself.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 401, description = "Missing token"),
        (status = 403, description = "Invalid token")
    )
)]
pub async fn get_me(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, AppError> {
    let user = state
        .repo
        .get_user(auth.id)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    Ok(Json(UserProfile::new(user, auth.permissions)))
}

/// upload_profile_photo
///
/// [Authenticated Route] Accepts a single file in the `photo` multipart field,
/// runs it through the upload gate, stores it, and records its public path on
/// the caller's profile.
#[utoipa::path(
    post,
    path = "/me/photo",
    responses(
        (status = 201, description = "Stored", body = UploadResponse),
        (status = 400, description = "Missing or duplicate file"),
        (status = 413, description = "File too large"),
        (status = 415, description = "Unsupported media type")
    )
)]
pub async fn upload_profile_photo(
    auth: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let policy = UploadPolicy::profile_photo(state.config.max_upload_bytes);

    let mut accepted = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload::multipart_error(e, policy.max_bytes()))?
    {
        if field.name() != Some(PROFILE_PHOTO_FIELD) {
            continue;
        }
        if accepted.is_some() {
            return Err(AppError::Validation(
                "only one profile photo may be uploaded".to_string(),
            ));
        }
        accepted = Some(upload::receive(&policy, field, state.storage.directory()).await?);
    }

    let (descriptor, bytes) = accepted.ok_or_else(|| {
        AppError::Validation(format!("missing file field '{PROFILE_PHOTO_FIELD}'"))
    })?;

    // The subject may have been deleted after the token was issued.
    state
        .repo
        .get_user(auth.id)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    state.storage.put(&descriptor, &bytes).await?;

    let url = format!("{PROFILE_PHOTO_URL_PREFIX}/{}", descriptor.stored_filename);
    state.repo.set_user_photo(auth.id, &url).await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            filename: descriptor.stored_filename,
            url,
            original_filename: descriptor.original_filename,
            content_type: descriptor.content_type,
            size: descriptor.size,
        }),
    ))
}

// --- Admin: users ---

/// list_users
///
/// [Admin Route] Requires `view_list_user`.
#[utoipa::path(
    get,
    path = "/admin/users",
    responses(
        (status = 200, description = "All users", body = [User]),
        (status = 403, description = "Insufficient permissions")
    )
)]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.repo.list_users().await?))
}

/// get_user
///
/// [Admin Route] Requires `view_user`.
#[utoipa::path(
    get,
    path = "/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Found", body = User),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    state
        .repo
        .get_user(id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("user"))
}

/// create_user
///
/// [Admin Route] Requires `create_user`.
#[utoipa::path(
    post,
    path = "/admin/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Created", body = User),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn create_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    payload.validate()?;

    let password_hash = password::hash_password(&payload.password)?;
    let user = state
        .repo
        .create_user(NewUser {
            name: payload.name,
            email: payload.email,
            role: payload.role,
            password_hash,
        })
        .await?;

    tracing::info!(actor = %auth.id, user_id = %user.id, role = %user.role, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

/// update_user
///
/// [Admin Route] Requires `update_user`. Absent fields are left untouched.
#[utoipa::path(
    put,
    path = "/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    payload.validate()?;

    let user = state
        .repo
        .update_user(id, payload)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    tracing::info!(actor = %auth.id, user_id = %user.id, "user updated");
    Ok(Json(user))
}

/// delete_user
///
/// [Admin Route] Requires `delete_user`.
#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.repo.delete_user(id).await? {
        return Err(AppError::NotFound("user"));
    }

    tracing::info!(actor = %auth.id, user_id = %id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Admin: roles ---

/// list_roles
///
/// [Admin Route] Requires `view_list_role`.
#[utoipa::path(
    get,
    path = "/admin/roles",
    responses((status = 200, description = "Roles and their permissions", body = [Role]))
)]
pub async fn list_roles(State(state): State<AppState>) -> Result<Json<Vec<Role>>, AppError> {
    Ok(Json(state.repo.list_roles().await?))
}
