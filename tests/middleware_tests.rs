//! Tests for the session middleware.
//!
//! Tests cover:
//! - Valid access tokens never touch storage
//! - Silent renewal from the refresh token, identity from the stored record
//! - Rejections for missing, unknown, expired and expiry-less refresh tokens
//! - The admin gate and its role re-verification
//! - Cookie attributes in production

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::{
    Json, Router,
    body::Body,
    http::{Request, StatusCode},
    middleware,
    routing::get,
};
use common::{
    ACCESS_TTL, MemoryUserRepository, body_json, cookie_header, cookie_value,
    expired_access_token, extract_set_cookies, forge_access_token, forge_access_token_with_secret,
    now, test_jwt, user_record,
};
use purple_auth::auth::{Auth, AuthState, AuthenticatedUser, CookiePolicy, require_admin, require_auth};
use purple_auth::db::{UserRepository, UserRole};
use tower::ServiceExt;

const REFRESH: &str = "stored-refresh-token";

async fn whoami(Auth(user): Auth) -> Json<AuthenticatedUser> {
    Json(user)
}

/// `/protected` behind `require_auth`, `/admin` behind `require_admin`.
fn protected_app(repo: Arc<MemoryUserRepository>, cookies: CookiePolicy) -> Router {
    let state = AuthState::new(Arc::new(test_jwt()), repo, cookies);

    let protected = Router::new()
        .route("/protected", get(whoami))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let admin = Router::new()
        .route("/admin", get(whoami))
        .layer(middleware::from_fn_with_state(state, require_admin));

    Router::new()
        .merge(protected)
        .merge(admin)
        .route("/unguarded", get(whoami))
}

fn dev_app(repo: Arc<MemoryUserRepository>) -> Router {
    protected_app(repo, CookiePolicy::development())
}

fn request(uri: &str, access: Option<&str>, refresh: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if access.is_some() || refresh.is_some() {
        builder = builder.header("cookie", cookie_header(access, refresh));
    }
    builder.body(Body::empty()).unwrap()
}

/// A user whose refresh token was issued ten minutes ago with a one-hour lifetime.
fn alice_with_live_refresh() -> Arc<MemoryUserRepository> {
    let expires_at = (now() + 50 * 60) as i64;
    MemoryUserRepository::with_users(vec![user_record(
        1,
        "alice",
        UserRole::User,
        Some(REFRESH),
        Some(expires_at),
    )])
}

// =============================================================================
// Valid access token
// =============================================================================

#[tokio::test]
async fn test_valid_access_token_never_queries_storage() {
    let repo = alice_with_live_refresh();
    let app = dev_app(repo.clone());
    let access = test_jwt()
        .generate_access_token(1, "alice", UserRole::User)
        .unwrap()
        .token;

    let response = app
        .oneshot(request("/protected", Some(&access), Some(REFRESH)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(extract_set_cookies(&response).is_empty());
    assert_eq!(repo.lookups(), 0);

    let body = body_json(response).await;
    assert_eq!(
        body,
        serde_json::json!({ "id": 1, "username": "alice", "role": "user" })
    );
}

#[tokio::test]
async fn test_identity_comes_from_payload_not_storage() {
    // The payload is trusted as-is, even when it disagrees with the record.
    let repo = alice_with_live_refresh();
    let app = dev_app(repo.clone());
    let now = now();
    let access = forge_access_token(1, "alice-old-name", Some(UserRole::Admin), now, now + 600);

    let response = app
        .oneshot(request("/protected", Some(&access), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["username"], "alice-old-name");
    assert_eq!(body["role"], "admin");
    assert_eq!(repo.lookups(), 0);
}

#[tokio::test]
async fn test_null_role_in_payload_is_accepted() {
    let repo = alice_with_live_refresh();
    let app = dev_app(repo);
    let now = now();
    let access = forge_access_token(1, "alice", None, now, now + 600);

    let response = app
        .oneshot(request("/protected", Some(&access), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["role"].is_null());
}

#[tokio::test]
async fn test_no_access_cookie_rejected_even_with_refresh() {
    let repo = alice_with_live_refresh();
    let app = dev_app(repo.clone());

    let response = app
        .oneshot(request("/protected", None, Some(REFRESH)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(extract_set_cookies(&response).is_empty());
    assert_eq!(repo.lookups(), 0);
    let body = body_json(response).await;
    assert_eq!(body, serde_json::json!({ "message": "No access token" }));
}

// =============================================================================
// Renewal
// =============================================================================

#[tokio::test]
async fn test_expired_access_renewed_with_stored_identity() {
    // Stored record has changed since the access token was issued.
    let expires_at = (now() + 50 * 60) as i64;
    let repo = MemoryUserRepository::with_users(vec![user_record(
        7,
        "alice-renamed",
        UserRole::Admin,
        Some(REFRESH),
        Some(expires_at),
    )]);
    let app = dev_app(repo.clone());
    let stale = expired_access_token(7, "alice", UserRole::User);

    let response = app
        .oneshot(request("/protected", Some(&stale), Some(REFRESH)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(repo.refresh_lookups.load(Ordering::SeqCst), 1);

    let cookies = extract_set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    let new_access = cookie_value(&cookies, "accessToken").unwrap();
    let claims = test_jwt().validate_access_token(&new_access).unwrap();
    assert_eq!(claims.name, "alice-renamed");
    assert_eq!(claims.id, 7);
    assert_eq!(claims.role, Some(UserRole::Admin));

    let body = body_json(response).await;
    assert_eq!(
        body,
        serde_json::json!({ "id": 7, "username": "alice-renamed", "role": "admin" })
    );
}

#[tokio::test]
async fn test_twenty_minute_old_access_token_continues_with_fresh_cookie() {
    let repo = alice_with_live_refresh();
    let app = dev_app(repo);
    let now = now();
    let access = forge_access_token(1, "alice", Some(UserRole::User), now - 20 * 60, now - 5 * 60);

    let response = app
        .oneshot(request("/protected", Some(&access), Some(REFRESH)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let cookies = extract_set_cookies(&response);
    assert_eq!(
        cookies.len(),
        1,
        "exactly one new access cookie: {:?}",
        cookies
    );
    let cookie = &cookies[0];
    assert!(cookie.starts_with("accessToken="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains(&format!("Max-Age={}", ACCESS_TTL)));
    assert!(!cookie.contains("Secure"));

    let new_access = cookie_value(&cookies, "accessToken").unwrap();
    let claims = test_jwt().validate_access_token(&new_access).unwrap();
    let expected = now + ACCESS_TTL;
    assert!(
        claims.exp >= expected && claims.exp <= expected + 5,
        "exp {} should be about 15 minutes from {}",
        claims.exp,
        now
    );
}

#[tokio::test]
async fn test_tampered_access_token_falls_through_to_refresh() {
    let repo = alice_with_live_refresh();
    let app = dev_app(repo.clone());
    let now = now();
    let tampered = forge_access_token_with_secret(
        1,
        "alice",
        Some(UserRole::Admin),
        now,
        now + 600,
        b"attacker-secret-attacker-secret-00",
    );

    let response = app
        .oneshot(request("/protected", Some(&tampered), Some(REFRESH)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(repo.refresh_lookups.load(Ordering::SeqCst), 1);
    let body = body_json(response).await;
    assert_eq!(body["role"], "user");
}

#[tokio::test]
async fn test_garbage_access_token_falls_through_to_refresh() {
    let repo = alice_with_live_refresh();
    let app = dev_app(repo);

    let response = app
        .oneshot(request("/protected", Some("not-a-jwt"), Some(REFRESH)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(cookie_value(&extract_set_cookies(&response), "accessToken").is_some());
}

#[tokio::test]
async fn test_renewal_does_not_rotate_refresh_token() {
    let repo = alice_with_live_refresh();
    let app = dev_app(repo.clone());
    let stale = expired_access_token(1, "alice", UserRole::User);

    let response = app
        .oneshot(request("/protected", Some(&stale), Some(REFRESH)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = extract_set_cookies(&response);
    assert!(cookie_value(&cookies, "refreshToken").is_none());

    // The stored slot still matches.
    let stored = repo
        .find_user_by_username("alice")
        .await
        .unwrap()
        .unwrap()
        .refresh_token;
    assert_eq!(stored.as_deref(), Some(REFRESH));
}

#[tokio::test]
async fn test_repeated_renewal_is_idempotent() {
    let repo = alice_with_live_refresh();
    let app = dev_app(repo.clone());
    let stale = expired_access_token(1, "alice", UserRole::User);

    let first = app
        .clone()
        .oneshot(request("/protected", Some(&stale), Some(REFRESH)))
        .await
        .unwrap();
    let second = app
        .oneshot(request("/protected", Some(&stale), Some(REFRESH)))
        .await
        .unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(extract_set_cookies(&first).len(), 1);
    assert_eq!(extract_set_cookies(&second).len(), 1);
    assert_eq!(body_json(first).await, body_json(second).await);
}

// =============================================================================
// Rejections
// =============================================================================

#[tokio::test]
async fn test_expired_access_without_refresh_rejected() {
    let repo = alice_with_live_refresh();
    let app = dev_app(repo.clone());
    let stale = expired_access_token(1, "alice", UserRole::User);

    let response = app
        .oneshot(request("/protected", Some(&stale), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(extract_set_cookies(&response).is_empty());
    assert_eq!(repo.lookups(), 0);
    let body = body_json(response).await;
    assert_eq!(body, serde_json::json!({ "message": "No refresh token" }));
}

#[tokio::test]
async fn test_unknown_refresh_token_rejected() {
    let repo = alice_with_live_refresh();
    let app = dev_app(repo);
    let stale = expired_access_token(1, "alice", UserRole::User);

    let response = app
        .oneshot(request("/protected", Some(&stale), Some("abc123")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(extract_set_cookies(&response).is_empty());
    let body = body_json(response).await;
    assert_eq!(body, serde_json::json!({ "message": "Invalid refresh token" }));
}

#[tokio::test]
async fn test_expired_refresh_token_forbidden() {
    let expired_at = (now() - 60) as i64;
    let repo = MemoryUserRepository::with_users(vec![user_record(
        1,
        "alice",
        UserRole::User,
        Some(REFRESH),
        Some(expired_at),
    )]);
    let app = dev_app(repo);
    let stale = expired_access_token(1, "alice", UserRole::User);

    let response = app
        .oneshot(request("/protected", Some(&stale), Some(REFRESH)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(extract_set_cookies(&response).is_empty());
    let body = body_json(response).await;
    assert_eq!(body, serde_json::json!({ "message": "Refresh token expired" }));
}

#[tokio::test]
async fn test_refresh_without_stored_expiry_is_invalid() {
    let repo = MemoryUserRepository::with_users(vec![user_record(
        1,
        "alice",
        UserRole::User,
        Some(REFRESH),
        None,
    )]);
    let app = dev_app(repo);
    let stale = expired_access_token(1, "alice", UserRole::User);

    let response = app
        .oneshot(request("/protected", Some(&stale), Some(REFRESH)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(extract_set_cookies(&response).is_empty());
    let body = body_json(response).await;
    assert_eq!(body, serde_json::json!({ "message": "Invalid refresh token" }));
}

#[tokio::test]
async fn test_storage_failure_during_renewal() {
    let repo = alice_with_live_refresh();
    repo.fail.store(true, Ordering::SeqCst);
    let app = dev_app(repo);
    let stale = expired_access_token(1, "alice", UserRole::User);

    let response = app
        .oneshot(request("/protected", Some(&stale), Some(REFRESH)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(extract_set_cookies(&response).is_empty());
    let body = body_json(response).await;
    assert_eq!(body, serde_json::json!({ "message": "Internal server error" }));
}

#[tokio::test]
async fn test_extractor_without_middleware_rejects() {
    let app = dev_app(alice_with_live_refresh());

    let response = app.oneshot(request("/unguarded", None, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Admin gate
// =============================================================================

#[tokio::test]
async fn test_admin_gate_rejects_user_role() {
    let repo = alice_with_live_refresh();
    let app = dev_app(repo);
    let access = test_jwt()
        .generate_access_token(1, "alice", UserRole::User)
        .unwrap()
        .token;

    let response = app
        .oneshot(request("/admin", Some(&access), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(extract_set_cookies(&response).is_empty());
    let body = body_json(response).await;
    assert_eq!(body, serde_json::json!({ "message": "Admin access required" }));
}

#[tokio::test]
async fn test_admin_gate_allows_admin() {
    let repo = MemoryUserRepository::with_users(vec![user_record(
        2,
        "root",
        UserRole::Admin,
        None,
        None,
    )]);
    let app = dev_app(repo.clone());
    let access = test_jwt()
        .generate_access_token(2, "root", UserRole::Admin)
        .unwrap()
        .token;

    let response = app
        .oneshot(request("/admin", Some(&access), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(repo.username_lookups.load(Ordering::SeqCst), 1);
    let body = body_json(response).await;
    assert_eq!(body["role"], "admin");
}

#[tokio::test]
async fn test_admin_gate_rejects_missing_user() {
    let repo = MemoryUserRepository::with_users(Vec::new());
    let app = dev_app(repo);
    let access = test_jwt()
        .generate_access_token(2, "ghost", UserRole::Admin)
        .unwrap()
        .token;

    let response = app
        .oneshot(request("/admin", Some(&access), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_demoted_admin_keeps_role_until_expiry_but_not_admin_routes() {
    let repo = MemoryUserRepository::with_users(vec![user_record(
        2,
        "root",
        UserRole::Admin,
        None,
        None,
    )]);
    let app = dev_app(repo.clone());
    let access = test_jwt()
        .generate_access_token(2, "root", UserRole::Admin)
        .unwrap()
        .token;

    repo.set_role(2, UserRole::User);

    let protected = app
        .clone()
        .oneshot(request("/protected", Some(&access), None))
        .await
        .unwrap();
    assert_eq!(protected.status(), StatusCode::OK);
    assert_eq!(body_json(protected).await["role"], "admin");

    let admin = app
        .oneshot(request("/admin", Some(&access), None))
        .await
        .unwrap();
    assert_eq!(admin.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_gate_renewal_rejected_for_user_emits_no_cookie() {
    let repo = alice_with_live_refresh();
    let app = dev_app(repo);
    let stale = expired_access_token(1, "alice", UserRole::User);

    let response = app
        .oneshot(request("/admin", Some(&stale), Some(REFRESH)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(extract_set_cookies(&response).is_empty());
}

// =============================================================================
// Cookie policy
// =============================================================================

#[tokio::test]
async fn test_production_renewal_cookie_is_secure_cross_site() {
    let repo = alice_with_live_refresh();
    let app = protected_app(repo, CookiePolicy::production());
    let stale = expired_access_token(1, "alice", UserRole::User);

    let response = app
        .oneshot(request("/protected", Some(&stale), Some(REFRESH)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = extract_set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].contains("SameSite=None"));
    assert!(cookies[0].ends_with("; Secure"));
}
