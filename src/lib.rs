use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Request pipeline: token verification, permission gate, upload gate.
pub mod auth;
pub mod permissions;
pub mod upload;

// Core application services and components.
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod password;
pub mod repository;
pub mod storage;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use auth::{Claims, TokenIssuer, TokenVerifier};
pub use config::AppConfig;
pub use error::AppError;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{LocalDiskStorage, MockStorageService, StorageState};

/// ApiDoc
///
/// OpenAPI document for every handler, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::get_me, handlers::upload_profile_photo,
        handlers::list_users, handlers::get_user, handlers::create_user,
        handlers::update_user, handlers::delete_user, handlers::list_roles
    ),
    components(
        schemas(
            models::User, models::Role, models::LoginRequest, models::LoginResponse,
            models::CreateUserRequest, models::UpdateUserRequest, models::UserProfile,
            models::UploadResponse,
        )
    ),
    tags(
        (name = "admin-portal", description = "User management portal API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Single immutable container for every shared service. Cloned per request;
/// all members are cheap handles.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: users, credentials, roles.
    pub repo: RepositoryState,
    /// Storage Layer: where accepted uploads are written.
    pub storage: StorageState,
    /// Configuration: the loaded, immutable environment configuration.
    pub config: AppConfig,
    /// Verifies bearer tokens against the configured secret.
    pub verifier: TokenVerifier,
    /// Signs tokens for the login endpoint with the same secret.
    pub issuer: TokenIssuer,
}

impl AppState {
    /// Builds the token verifier and issuer from `config.jwt_secret`.
    pub fn new(repo: RepositoryState, storage: StorageState, config: AppConfig) -> Self {
        let verifier = TokenVerifier::new(&config.jwt_secret);
        let issuer = TokenIssuer::new(&config.jwt_secret, config.token_ttl_secs);

        Self {
            repo,
            storage,
            config,
            verifier,
            issuer,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the routing tree, applies global and scoped middleware, and
/// registers the application state.
///
/// Request order on protected routes: `auth::authenticate` (outer route layer)
/// → `permissions::gate` (per-route layer, admin only) → handler.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Protected tree: everything below requires a verified token.
    let protected = Router::new()
        .merge(authenticated::authenticated_routes(
            state.config.multipart_body_limit(),
        ))
        .nest("/admin", admin::admin_routes())
        .route_layer(middleware::from_fn_with_state(
            state.verifier.clone(),
            auth::authenticate,
        ));

    // 3. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(protected)
        // Stored uploads are public by path, like the frontend expects.
        .nest_service("/uploads", ServeDir::new(&state.config.uploads_root))
        .with_state(state);

    // 4. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                // Generates a UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // Echo the request id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span so every log line for a request carries its id.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
