//! Authentication endpoints.
//!
//! - POST `/register` - Create an account
//! - POST `/login` - Verify password, issue access and refresh tokens
//! - POST `/token` - Exchange the refresh token cookie for a new access token
//! - POST `/logout` - Clear both cookies

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    middleware,
    response::{AppendHeaders, IntoResponse},
    routing::post,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::{ApiError, ResultExt};
use super::password::{hash_password, verify_password};
use crate::auth::{AuthErrorKind, AuthState, REFRESH_COOKIE_NAME, get_cookie, renew_access_token};
use crate::db::{Database, RepositoryError, UserRole};
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_register};

const MAX_USERNAME_LENGTH: usize = 32;

#[derive(Clone)]
pub struct AuthRoutesState {
    pub db: Database,
    pub auth: AuthState,
}

pub fn router(state: AuthRoutesState, rate_limits: RateLimitConfig) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            rate_limits.clone(),
            rate_limit_login,
        ));

    let register_router = Router::new()
        .route("/register", post(register))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            rate_limits,
            rate_limit_register,
        ));

    Router::new()
        .route("/token", post(refresh_token))
        .route("/logout", post(logout))
        .with_state(state)
        .merge(login_router)
        .merge(register_router)
}

#[derive(Deserialize)]
struct Credentials {
    username: Option<String>,
    password: Option<String>,
}

impl Credentials {
    /// Both fields, or a 400 if either is missing or empty.
    fn required(self) -> Result<(String, String), ApiError> {
        match (self.username, self.password) {
            (Some(username), Some(password))
                if !username.trim().is_empty() && !password.is_empty() =>
            {
                Ok((username.trim().to_string(), password))
            }
            _ => Err(ApiError::bad_request("Username and password required")),
        }
    }
}

#[derive(Serialize)]
struct RegisterResponse {
    id: i64,
    username: String,
    role: UserRole,
}

async fn register(
    State(state): State<AuthRoutesState>,
    Json(payload): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    let (username, password) = payload.required()?;

    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(ApiError::bad_request(
            "Username cannot be longer than 32 characters",
        ));
    }

    let existing = state
        .db
        .users()
        .get_by_username(&username)
        .await
        .db_err("Failed to check username")?;

    if existing.is_some() {
        return Err(ApiError::bad_request("This username already exists"));
    }

    let password_hash = hash_password(password).await?;

    let id = match state
        .db
        .users()
        .create(&username, &password_hash, UserRole::User)
        .await
    {
        Ok(id) => id,
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            return Err(ApiError::bad_request("This username already exists"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to create user", e)),
    };

    info!(user_id = id, username = %username, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id,
            username,
            role: UserRole::User,
        }),
    ))
}

#[derive(Serialize)]
struct LoginResponse {
    message: &'static str,
    username: String,
    role: UserRole,
}

/// Issues a fresh access/refresh pair. The new refresh token overwrites the
/// user's previous one, ending any other session on the account.
async fn login(
    State(state): State<AuthRoutesState>,
    Json(payload): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    let (username, password) = payload.required()?;

    let user = state
        .db
        .users()
        .get_by_username(&username)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if !verify_password(password, user.password_hash.clone()).await? {
        warn!(user_id = user.id, "Incorrect password");
        return Err(ApiError::unauthorized("Incorrect password"));
    }

    let jwt = &state.auth.jwt;
    let access = jwt
        .generate_access_token(user.id, &user.username, user.role)
        .internal_err("Failed to generate access token")?;
    let refresh = jwt
        .generate_refresh_token(user.id, &user.username, user.role)
        .internal_err("Failed to generate refresh token")?;

    // The account can be deleted between the lookup and this write.
    match state
        .auth
        .users
        .update_user_refresh_token(user.id, &refresh.token, refresh.expires_at as i64)
        .await
    {
        Ok(()) => {}
        Err(RepositoryError::NotFound(id)) => {
            warn!(user_id = id, "User disappeared during login");
            return Err(ApiError::not_found("User not found"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to store refresh token", e)),
    }

    info!(user_id = user.id, "User logged in");

    let cookies = &state.auth.cookies;
    Ok((
        StatusCode::OK,
        AppendHeaders([
            (SET_COOKIE, cookies.access_cookie(&access.token, access.duration)),
            (
                SET_COOKIE,
                cookies.refresh_cookie(&refresh.token, refresh.duration),
            ),
        ]),
        Json(LoginResponse {
            message: "Login successful",
            username: user.username,
            role: user.role,
        }),
    ))
}

/// Explicit renewal for clients that want a new access token without
/// making a protected request. Every refusal here is a 403.
async fn refresh_token(
    State(state): State<AuthRoutesState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let refresh_token = get_cookie(&headers, REFRESH_COOKIE_NAME)
        .ok_or_else(|| ApiError::forbidden("No refresh token"))?;

    let renewal = renew_access_token(&state.auth, refresh_token)
        .await
        .map_err(|kind| match kind {
            AuthErrorKind::Internal => ApiError::internal("Server error"),
            other => ApiError::forbidden(other.message()),
        })?;

    Ok((
        StatusCode::OK,
        [(SET_COOKIE, renewal.access_cookie)],
        Json(serde_json::json!({ "message": "New access token generated" })),
    ))
}

/// Clears both cookies. The stored refresh token is left in place and
/// is replaced on the next login.
async fn logout(State(state): State<AuthRoutesState>) -> impl IntoResponse {
    let [clear_access, clear_refresh] = state.auth.cookies.clear_cookies();

    (
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, clear_access), (SET_COOKIE, clear_refresh)]),
        Json(serde_json::json!({ "message": "Logout successful" })),
    )
}
