mod common;

use admin_portal::{
    TokenVerifier,
    models::{LoginResponse, NewUser, Role, User},
    password::hash_password,
    permissions::{self, CREATE_USER, DELETE_USER, UPDATE_USER, VIEW_LIST_USER, VIEW_USER},
    repository::Repository,
};
use axum::http::{Request, StatusCode};
use common::*;
use serde_json::json;
use tower::util::ServiceExt;
use uuid::Uuid;

const PASSWORD: &str = "correct-horse-battery";

async fn seed_with_password(app: &TestApp, email: &str, role: &str) -> User {
    app.repo
        .create_user(NewUser {
            name: "Login User".to_string(),
            email: email.to_string(),
            role: role.to_string(),
            password_hash: hash_password(PASSWORD).unwrap(),
        })
        .await
        .unwrap()
}

fn login_request(email: &str, password: &str) -> Request<axum::body::Body> {
    json_request(
        "POST",
        "/auth/login",
        None,
        &json!({ "email": email, "password": password }),
    )
}

fn admin_token() -> String {
    token_for(Uuid::new_v4(), "admin", permissions::ALL)
}

// --- Login ---

#[tokio::test]
async fn login_issues_a_token_carrying_role_permissions() {
    let app = test_app();
    let user = seed_with_password(&app, "staff@example.com", "staff").await;

    let response = app
        .router
        .oneshot(login_request("staff@example.com", PASSWORD))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: LoginResponse = read_json(response).await;
    assert_eq!(body.token_type, "Bearer");
    assert_eq!(body.user.id, user.id);
    assert_eq!(body.user.permissions, vec![VIEW_LIST_USER, VIEW_USER]);

    let claims = TokenVerifier::new(TEST_JWT_SECRET)
        .verify(&body.token)
        .unwrap();
    assert_eq!(claims.id, user.id);
    assert_eq!(claims.role, "staff");
    assert_eq!(claims.exp, body.expires_at);
    assert!(claims.has_permission(VIEW_USER));
    assert!(!claims.has_permission(CREATE_USER));
}

#[tokio::test]
async fn login_email_is_case_insensitive() {
    let app = test_app();
    seed_with_password(&app, "mixed@example.com", "staff").await;

    let response = app
        .router
        .oneshot(login_request("MIXED@example.com", PASSWORD))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn login_with_wrong_password_is_401() {
    let app = test_app();
    seed_with_password(&app, "staff@example.com", "staff").await;

    let response = app
        .router
        .oneshot(login_request("staff@example.com", "not-the-password"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn login_with_unknown_email_is_indistinguishable_from_wrong_password() {
    let app = test_app();

    let response = app
        .router
        .oneshot(login_request("nobody@example.com", PASSWORD))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn login_with_malformed_email_is_400() {
    let app = test_app();

    let response = app
        .router
        .oneshot(login_request("not-an-email", PASSWORD))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, "VALIDATION_FAILED");
}

// --- Me ---

#[tokio::test]
async fn me_for_a_deleted_subject_is_404() {
    let app = test_app();
    let token = token_for(Uuid::new_v4(), "staff", &[VIEW_USER]);

    let response = app
        .router
        .oneshot(get_request("/me", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// --- Admin: users ---

#[tokio::test]
async fn create_then_fetch_user() {
    let app = test_app();
    let token = admin_token();

    let created = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/admin/users",
            Some(&token),
            &json!({
                "name": "Dana",
                "email": "dana@example.com",
                "password": "long-enough-password",
                "role": "staff"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let created: User = read_json(created).await;
    assert_eq!(created.email, "dana@example.com");
    assert_eq!(created.photo, None);

    let fetched = app
        .router
        .oneshot(get_request(
            &format!("/admin/users/{}", created.id),
            Some(&token),
        ))
        .await
        .unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);
    let fetched: User = read_json(fetched).await;
    assert_eq!(fetched, created);

    let stored = app
        .repo
        .find_credentials("dana@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_ne!(stored.password_hash, "long-enough-password");
}

#[tokio::test]
async fn created_user_can_log_in() {
    let app = test_app();
    let token = admin_token();

    let created = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/admin/users",
            Some(&token),
            &json!({
                "name": "Eli",
                "email": "eli@example.com",
                "password": PASSWORD,
                "role": "admin"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);

    let login = app
        .router
        .oneshot(login_request("eli@example.com", PASSWORD))
        .await
        .unwrap();

    assert_eq!(login.status(), StatusCode::OK);
    let body: LoginResponse = read_json(login).await;
    assert_eq!(body.user.permissions.len(), permissions::ALL.len());
}

#[tokio::test]
async fn duplicate_email_is_409() {
    let app = test_app();
    seed_user(&app.repo, "taken@example.com", "staff").await;

    let response = app
        .router
        .oneshot(json_request(
            "POST",
            "/admin/users",
            Some(&admin_token()),
            &json!({
                "name": "Again",
                "email": "TAKEN@example.com",
                "password": "long-enough-password",
                "role": "staff"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(response).await, "CONFLICT");
}

#[tokio::test]
async fn unknown_role_is_400() {
    let app = test_app();

    let response = app
        .router
        .oneshot(json_request(
            "POST",
            "/admin/users",
            Some(&admin_token()),
            &json!({
                "name": "Ghost",
                "email": "ghost@example.com",
                "password": "long-enough-password",
                "role": "superuser"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn short_password_is_400() {
    let app = test_app();

    let response = app
        .router
        .oneshot(json_request(
            "POST",
            "/admin/users",
            Some(&admin_token()),
            &json!({
                "name": "Short",
                "email": "short@example.com",
                "password": "short",
                "role": "staff"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, "VALIDATION_FAILED");
    assert!(app.repo.list_users().await.unwrap().is_empty());
}

#[tokio::test]
async fn list_users_returns_every_user() {
    let app = test_app();
    seed_user(&app.repo, "one@example.com", "staff").await;
    seed_user(&app.repo, "two@example.com", "admin").await;
    let token = token_for(Uuid::new_v4(), "staff", &[VIEW_LIST_USER]);

    let response = app
        .router
        .oneshot(get_request("/admin/users", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let users: Vec<User> = read_json(response).await;
    assert_eq!(users.len(), 2);
}

#[tokio::test]
async fn update_changes_only_present_fields() {
    let app = test_app();
    let user = seed_user(&app.repo, "before@example.com", "staff").await;
    let token = token_for(Uuid::new_v4(), "admin", &[UPDATE_USER]);

    let response = app
        .router
        .oneshot(json_request(
            "PUT",
            &format!("/admin/users/{}", user.id),
            Some(&token),
            &json!({ "role": "admin" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let updated: User = read_json(response).await;
    assert_eq!(updated.role, "admin");
    assert_eq!(updated.email, "before@example.com");
    assert_eq!(updated.name, user.name);
}

#[tokio::test]
async fn update_missing_user_is_404() {
    let app = test_app();
    let token = token_for(Uuid::new_v4(), "admin", &[UPDATE_USER]);

    let response = app
        .router
        .oneshot(json_request(
            "PUT",
            &format!("/admin/users/{}", Uuid::new_v4()),
            Some(&token),
            &json!({ "name": "Nobody" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_is_204_then_404() {
    let app = test_app();
    let user = seed_user(&app.repo, "gone@example.com", "staff").await;
    let token = token_for(Uuid::new_v4(), "admin", &[DELETE_USER]);
    let uri = format!("/admin/users/{}", user.id);
    let delete = || {
        Request::builder()
            .method("DELETE")
            .uri(&uri)
            .header(axum::http::header::AUTHORIZATION, bearer(&token))
            .body(axum::body::Body::empty())
            .unwrap()
    };

    let first = app.router.clone().oneshot(delete()).await.unwrap();
    let second = app.router.oneshot(delete()).await.unwrap();

    assert_eq!(first.status(), StatusCode::NO_CONTENT);
    assert_eq!(second.status(), StatusCode::NOT_FOUND);
    assert!(app.repo.get_user(user.id).await.unwrap().is_none());
}

#[tokio::test]
async fn view_user_token_cannot_delete() {
    let app = test_app();
    let user = seed_user(&app.repo, "kept@example.com", "staff").await;
    let token = token_for(Uuid::new_v4(), "staff", &[VIEW_USER, VIEW_LIST_USER]);

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/admin/users/{}", user.id))
        .header(axum::http::header::AUTHORIZATION, bearer(&token))
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(app.repo.get_user(user.id).await.unwrap().is_some());
}

// --- Admin: roles ---

#[tokio::test]
async fn roles_list_the_seeded_permissions() {
    let app = test_app();
    let token = token_for(Uuid::new_v4(), "admin", &[permissions::VIEW_LIST_ROLE]);

    let response = app
        .router
        .oneshot(get_request("/admin/roles", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let roles: Vec<Role> = read_json(response).await;
    let staff = roles.iter().find(|r| r.name == "staff").unwrap();
    assert_eq!(staff.permissions, vec![VIEW_LIST_USER, VIEW_USER]);
    let admin = roles.iter().find(|r| r.name == "admin").unwrap();
    assert_eq!(admin.permissions.len(), permissions::ALL.len());
}
