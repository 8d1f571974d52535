#![allow(dead_code)]

use admin_portal::{
    AppConfig, AppState, Claims, InMemoryRepository, MockStorageService, create_router,
    error::ErrorResponse,
    models::{NewUser, User},
    repository::Repository,
};
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";
pub const BOUNDARY: &str = "----admin-portal-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<InMemoryRepository>,
    pub storage: MockStorageService,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    }
}

pub fn test_app() -> TestApp {
    test_app_with_storage(MockStorageService::new())
}

pub fn test_app_with_storage(storage: MockStorageService) -> TestApp {
    let repo = Arc::new(InMemoryRepository::with_default_roles());
    let state = AppState::new(repo.clone(), Arc::new(storage.clone()), test_config());

    TestApp {
        router: create_router(state),
        repo,
        storage,
    }
}

/// Inserts a user whose password hash is a placeholder; login will not work for it.
pub async fn seed_user(repo: &InMemoryRepository, email: &str, role: &str) -> User {
    repo.create_user(NewUser {
        name: "Seeded User".to_string(),
        email: email.to_string(),
        role: role.to_string(),
        password_hash: "unused".to_string(),
    })
    .await
    .unwrap()
}

pub fn claims_for(id: Uuid, role: &str, permissions: &[&str], exp_offset: i64) -> Claims {
    let now = Utc::now().timestamp();
    Claims {
        id,
        role: role.to_string(),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
        iat: now,
        exp: now + exp_offset,
    }
}

pub fn sign_with(secret: &str, claims: &Claims) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

/// A token valid for one hour, signed with the test secret.
pub fn token_for(id: Uuid, role: &str, permissions: &[&str]) -> String {
    sign_with(TEST_JWT_SECRET, &claims_for(id, role, permissions, 3600))
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, bearer(token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: &serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, bearer(token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Builds a single-part multipart body.
pub fn multipart_body(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 256);
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(token: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/me/photo")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, bearer(token));
    }
    builder.body(Body::from(body)).unwrap()
}

pub async fn read_json<T: DeserializeOwned>(response: Response<Body>) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn error_code(response: Response<Body>) -> String {
    read_json::<ErrorResponse>(response).await.error.code
}
