//! API integration tests.
//!
//! These drive the assembled router over a migrated in-memory database.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use chorus_api::{AppState, app};
use chorus_common::Config;
use chorus_core::{CredentialService, EventBus};
use chorus_db::{
    entities::user::{self, Role, UserStatus},
    test_utils::TestDatabase,
};
use serde_json::{Value, json};
use tower::ServiceExt;

struct TestApp {
    db: TestDatabase,
    router: Router,
    credentials: CredentialService,
}

impl TestApp {
    async fn new() -> Self {
        let db = TestDatabase::in_memory().await.unwrap();
        let config = Config::for_tests();
        let state = AppState::new(db.connection(), EventBus::new(16), &config);

        Self {
            router: app(state),
            credentials: CredentialService::from_config(&config.auth),
            db,
        }
    }

    fn token(&self, user: &user::Model) -> String {
        self.credentials.issue(user).unwrap().token
    }

    async fn user(&self, username: &str, role: Role) -> (user::Model, String) {
        let user = self.db.create_user(username, role).await.unwrap();
        let token = self.token(&user);
        (user, token)
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let (status, body) = app.send(Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_register_then_read_profile() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "email": "Alice@Example.com",
                "username": "alice",
                "password": "correct horse battery",
                "displayName": "Alice"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(Method::GET, "/api/users/me", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "alice");
    assert_eq!(body["data"]["email"], "alice@example.com");
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let app = TestApp::new().await;
    let payload = json!({
        "email": "bob@example.com",
        "username": "bob",
        "password": "long enough secret"
    });

    let (first, _) = app
        .send(Method::POST, "/api/auth/register", None, Some(payload.clone()))
        .await;
    let (second, body) = app
        .send(Method::POST, "/api/auth/register", None, Some(payload))
        .await;

    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_protected_route_requires_credential() {
    let app = TestApp::new().await;
    let (status, body) = app.send(Method::GET, "/api/users/me", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTHENTICATION_REQUIRED");
}

#[tokio::test]
async fn test_invalid_credential_degrades_on_public_routes_only() {
    let app = TestApp::new().await;

    let (status, _) = app
        .send(Method::GET, "/api/posts/explore", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(Method::GET, "/api/users/me", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_CREDENTIAL");
}

#[tokio::test]
async fn test_non_bearer_header_is_an_invalid_credential() {
    let app = TestApp::new().await;
    let request = Request::builder()
        .uri("/api/notifications/unread-count")
        .header(header::AUTHORIZATION, "Basic YWxpY2U6c2VjcmV0")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_blocked_account_is_refused_with_existing_credential() {
    let app = TestApp::new().await;
    let user = app
        .db
        .create_user_with_status("mallory", Role::User, UserStatus::Blocked)
        .await
        .unwrap();
    let token = app.token(&user);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/posts",
            Some(&token),
            Some(json!({ "content": "still here?" })),
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "ACCOUNT_BLOCKED");
}

#[tokio::test]
async fn test_follow_twice_conflicts() {
    let app = TestApp::new().await;
    let (_, alice) = app.user("alice", Role::User).await;
    let (bob, _) = app.user("bob", Role::User).await;
    let uri = format!("/api/users/{}/follow", bob.id);

    let (first, _) = app.send(Method::POST, &uri, Some(&alice), None).await;
    let (second, body) = app.send(Method::POST, &uri, Some(&alice), None).await;

    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_FOLLOWING");

    let (status, _) = app.send(Method::DELETE, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_like_endpoint_toggles() {
    let app = TestApp::new().await;
    let (author, _) = app.user("author", Role::User).await;
    let (_, fan) = app.user("fan", Role::User).await;
    let post = app.db.create_post(&author.id, "hello").await.unwrap();
    let uri = format!("/api/posts/{}/like", post.id);

    let (_, liked) = app.send(Method::POST, &uri, Some(&fan), None).await;
    let (_, unliked) = app.send(Method::POST, &uri, Some(&fan), None).await;

    assert_eq!(liked["data"]["isLiked"], true);
    assert_eq!(liked["data"]["likeCount"], 1);
    assert_eq!(unliked["data"]["isLiked"], false);
    assert_eq!(unliked["data"]["likeCount"], 0);

    let author_token = app.token(&author);
    let (status, body) = app
        .send(
            Method::GET,
            "/api/notifications/unread-count",
            Some(&author_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 1);
}

#[tokio::test]
async fn test_unknown_post_is_not_found() {
    let app = TestApp::new().await;
    let (status, body) = app
        .send(Method::GET, "/api/posts/does-not-exist", None, None)
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_admin_routes_admit_exact_roles() {
    let app = TestApp::new().await;
    let (_, user) = app.user("plain", Role::User).await;
    let (_, admin) = app.user("moderator", Role::Admin).await;
    let (_, god) = app.user("owner", Role::God).await;

    let (status, _) = app
        .send(Method::GET, "/api/admin/stats", Some(&user), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(Method::GET, "/api/admin/stats", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["userCount"], 3);

    let (status, body) = app
        .send(Method::GET, "/api/admin/stats", Some(&god), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_PERMISSIONS");

    let (status, _) = app
        .send(Method::GET, "/api/god/system-info", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(Method::GET, "/api/god/system-info", Some(&god), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["systemHealth"], "HEALTHY");
}

#[tokio::test]
async fn test_admin_block_revokes_access() {
    let app = TestApp::new().await;
    let (_, admin) = app.user("moderator", Role::Admin).await;
    let (target, target_token) = app.user("spammer", Role::User).await;

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/admin/users/{}/block", target.id),
            Some(&admin),
            Some(json!({ "reason": "spam" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "BLOCKED");

    let (status, body) = app
        .send(Method::GET, "/api/users/me", Some(&target_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "ACCOUNT_BLOCKED");
}

#[tokio::test]
async fn test_maintenance_state_is_public_without_operator() {
    let app = TestApp::new().await;
    let (_, god) = app.user("owner", Role::God).await;

    let (status, _) = app
        .send(
            Method::POST,
            "/api/god/maintenance",
            Some(&god),
            Some(json!({ "enabled": true, "message": "Upgrading" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(Method::GET, "/api/god/maintenance", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["enabled"], true);
    assert_eq!(body["data"]["message"], "Upgrading");
    assert!(body["data"].get("setBy").is_none());

    let blocked = app
        .db
        .create_user_with_status("mallory", Role::User, UserStatus::Blocked)
        .await
        .unwrap();
    let (status, body) = app
        .send(
            Method::GET,
            "/api/god/maintenance",
            Some(&app.token(&blocked)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "ACCOUNT_BLOCKED");
}
