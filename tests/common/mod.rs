#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use purple_auth::{
    ServerConfig, create_app,
    db::{Database, RepositoryError, User, UserRepository, UserRole},
    jwt::{AccessClaims, JwtConfig, TokenSettings},
    rate_limit::RateLimitConfig,
};
use tower::ServiceExt;

pub const ACCESS_SECRET: &[u8] = b"test-access-secret-0123456789abcdef";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-0123456789abcdef";

/// Access TTL used by every test app: 15 minutes.
pub const ACCESS_TTL: u64 = 15 * 60;
/// Refresh TTL used by every test app: 1 hour.
pub const REFRESH_TTL: u64 = 60 * 60;

pub fn test_token_settings() -> TokenSettings {
    TokenSettings {
        access_secret: ACCESS_SECRET.to_vec(),
        refresh_secret: REFRESH_SECRET.to_vec(),
        access_ttl: Duration::from_secs(ACCESS_TTL),
        refresh_ttl: Duration::from_secs(REFRESH_TTL),
    }
}

pub fn test_jwt() -> JwtConfig {
    JwtConfig::new(&test_token_settings())
}

pub fn now() -> u64 {
    purple_auth::jwt::now_secs().unwrap()
}

/// Sign an access token with arbitrary timestamps, e.g. one that expired
/// five minutes ago.
pub fn forge_access_token(
    id: i64,
    name: &str,
    role: Option<UserRole>,
    iat: u64,
    exp: u64,
) -> String {
    forge_access_token_with_secret(id, name, role, iat, exp, ACCESS_SECRET)
}

pub fn forge_access_token_with_secret(
    id: i64,
    name: &str,
    role: Option<UserRole>,
    iat: u64,
    exp: u64,
    secret: &[u8],
) -> String {
    let claims = AccessClaims {
        name: name.to_string(),
        id,
        role,
        iat,
        exp,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret),
    )
    .unwrap()
}

/// An access token that expired five minutes ago.
pub fn expired_access_token(id: i64, name: &str, role: UserRole) -> String {
    let now = now();
    forge_access_token(id, name, Some(role), now - 20 * 60, now - 5 * 60)
}

pub fn user_record(
    id: i64,
    username: &str,
    role: UserRole,
    refresh_token: Option<&str>,
    refresh_token_expires_at: Option<i64>,
) -> User {
    User {
        id,
        username: username.to_string(),
        password_hash: String::new(),
        role,
        refresh_token: refresh_token.map(str::to_string),
        refresh_token_expires_at,
    }
}

/// In-memory [`UserRepository`] that counts lookups.
#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<Vec<User>>,
    pub refresh_lookups: AtomicUsize,
    pub username_lookups: AtomicUsize,
    pub fail: AtomicBool,
}

impl MemoryUserRepository {
    pub fn with_users(users: Vec<User>) -> Arc<Self> {
        Arc::new(Self {
            users: Mutex::new(users),
            ..Default::default()
        })
    }

    pub fn lookups(&self) -> usize {
        self.refresh_lookups.load(Ordering::SeqCst) + self.username_lookups.load(Ordering::SeqCst)
    }

    pub fn set_role(&self, user_id: i64, role: UserRole) {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.iter_mut().find(|u| u.id == user_id) {
            user.role = role;
        }
    }

    fn check_available(&self) -> Result<(), RepositoryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("storage offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_user_by_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<User>, RepositoryError> {
        self.refresh_lookups.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .find(|u| u.refresh_token.as_deref() == Some(token))
            .cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        self.username_lookups.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.username == username).cloned())
    }

    async fn update_user_refresh_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: i64,
    ) -> Result<(), RepositoryError> {
        self.check_available()?;
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(RepositoryError::NotFound(user_id))?;
        user.refresh_token = Some(token.to_string());
        user.refresh_token_expires_at = Some(expires_at);
        Ok(())
    }
}

/// Create a test app backed by an in-memory database, with rate limits
/// high enough not to interfere.
pub async fn create_test_app() -> (Router, Database) {
    create_test_app_with_limits(RateLimitConfig::new(1000, 1000, 1000)).await
}

pub async fn create_test_app_with_limits(rate_limits: RateLimitConfig) -> (Router, Database) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let config = ServerConfig {
        db: db.clone(),
        tokens: test_token_settings(),
        production: false,
        rate_limits,
    };
    (create_app(&config), db)
}

/// Insert a user directly. Uses a low bcrypt cost to keep tests fast.
pub async fn seed_user(db: &Database, username: &str, password: &str, role: UserRole) -> i64 {
    let hash = bcrypt::hash(password, 4).unwrap();
    db.users().create(username, &hash, role).await.unwrap()
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn cookie_header(access: Option<&str>, refresh: Option<&str>) -> String {
    let mut parts = Vec::new();
    if let Some(access) = access {
        parts.push(format!("accessToken={}", access));
    }
    if let Some(refresh) = refresh {
        parts.push(format!("refreshToken={}", refresh));
    }
    parts.join("; ")
}

/// Extract Set-Cookie headers from response
pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Value of the named cookie in a list of Set-Cookie headers.
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    cookies.iter().find_map(|c| {
        c.strip_prefix(&prefix)
            .and_then(|rest| rest.split(';').next())
            .map(str::to_string)
    })
}

/// Check if cookies contain the named cookie being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String], name: &str) -> bool {
    let prefix = format!("{}=;", name);
    cookies
        .iter()
        .any(|c| c.starts_with(&prefix) && c.contains("Max-Age=0"))
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Log in through the API and return (access token, refresh token).
pub async fn login(app: &Router, username: &str, password: &str) -> (String, String) {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/login",
            serde_json::json!({ "username": username, "password": password }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200, "login failed for {}", username);

    let cookies = extract_set_cookies(&response);
    (
        cookie_value(&cookies, "accessToken").expect("access cookie"),
        cookie_value(&cookies, "refreshToken").expect("refresh cookie"),
    )
}
