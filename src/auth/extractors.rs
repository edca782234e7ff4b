//! Session middleware and the extractor handlers use to read its result.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, HeaderValue, header, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error, info, warn};

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, get_cookie};
use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::AuthState;
use super::types::{AuthOutcome, AuthenticatedUser, Renewal};
use crate::db::UserRole;
use crate::jwt::now_secs;

/// Core authentication logic shared by [`require_auth`] and [`require_admin`].
///
/// A valid access token is trusted as-is and storage is never consulted. Any
/// access token that fails validation, whether tampered or merely expired,
/// falls through to the refresh token.
pub async fn authenticate_request(
    headers: &HeaderMap,
    state: &AuthState,
) -> Result<AuthOutcome, AuthErrorKind> {
    let access_token =
        get_cookie(headers, ACCESS_COOKIE_NAME).ok_or(AuthErrorKind::NoAccessToken)?;

    if let Ok(claims) = state.jwt.validate_access_token(access_token) {
        return Ok(AuthOutcome {
            user: claims.into(),
            new_access_cookie: None,
        });
    }

    debug!("Access token invalid or expired, trying refresh token");

    let refresh_token =
        get_cookie(headers, REFRESH_COOKIE_NAME).ok_or(AuthErrorKind::NoRefreshToken)?;

    let renewal = renew_access_token(state, refresh_token).await?;

    Ok(AuthOutcome {
        user: AuthenticatedUser::from(&renewal.user),
        new_access_cookie: Some(renewal.access_cookie),
    })
}

/// Exchange a persisted refresh token for a new access token cookie.
///
/// The refresh token itself is not rotated. A stored record without an
/// expiry is treated as invalid.
pub async fn renew_access_token(
    state: &AuthState,
    refresh_token: &str,
) -> Result<Renewal, AuthErrorKind> {
    let user = state
        .users
        .find_user_by_refresh_token(refresh_token)
        .await
        .map_err(|e| {
            error!("Failed to look up refresh token: {}", e);
            AuthErrorKind::Internal
        })?
        .ok_or(AuthErrorKind::InvalidRefreshToken)?;

    let Some(expires_at) = user.refresh_token_expires_at else {
        warn!(user_id = user.id, "Stored refresh token has no expiry");
        return Err(AuthErrorKind::InvalidRefreshToken);
    };

    let now = now_secs().map_err(|e| {
        error!("{}", e);
        AuthErrorKind::Internal
    })?;

    if now as i64 > expires_at {
        debug!(user_id = user.id, "Refresh token expired");
        return Err(AuthErrorKind::RefreshTokenExpired);
    }

    let access = state
        .jwt
        .generate_access_token(user.id, &user.username, user.role)
        .map_err(|e| {
            error!("Failed to generate access token: {}", e);
            AuthErrorKind::Internal
        })?;

    let access_cookie = state.cookies.access_cookie(&access.token, access.duration);

    info!(user_id = user.id, "Access token renewed");

    Ok(Renewal {
        user,
        access_cookie,
    })
}

fn append_cookie(response: &mut Response, cookie: Option<String>) {
    let Some(cookie) = cookie else {
        return;
    };
    // A handler that set its own access cookie (e.g. clearing it) wins.
    let prefix = format!("{}=", ACCESS_COOKIE_NAME);
    let handler_set_access = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .any(|v| v.to_str().is_ok_and(|s| s.starts_with(&prefix)));
    if handler_set_access {
        return;
    }
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => error!("Renewed access cookie is not a valid header: {}", e),
    }
}

/// Middleware for routes that require a signed-in user.
///
/// Attaches [`AuthenticatedUser`] to the request and, when the access token
/// was renewed, sets the new access token cookie on the response.
pub async fn require_auth(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiAuthError> {
    let outcome = authenticate_request(request.headers(), &state).await?;

    request.extensions_mut().insert(outcome.user);

    let mut response = next.run(request).await;
    append_cookie(&mut response, outcome.new_access_cookie);
    Ok(response)
}

/// Middleware for admin-only routes.
///
/// Unlike [`require_auth`], the role is re-read from storage on every
/// request, so a demoted admin is refused immediately.
pub async fn require_admin(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiAuthError> {
    let outcome = authenticate_request(request.headers(), &state).await?;

    let stored = state
        .users
        .find_user_by_username(&outcome.user.username)
        .await
        .map_err(|e| {
            error!("Failed to load user for admin check: {}", e);
            ApiAuthError(AuthErrorKind::Internal)
        })?;

    let admin = match stored {
        Some(user) if user.role == UserRole::Admin => user,
        _ => {
            warn!(username = %outcome.user.username, "Admin access denied");
            return Err(ApiAuthError(AuthErrorKind::AdminRequired));
        }
    };

    request
        .extensions_mut()
        .insert(AuthenticatedUser::from(&admin));

    let mut response = next.run(request).await;
    append_cookie(&mut response, outcome.new_access_cookie);
    Ok(response)
}

/// Extractor for the identity attached by [`require_auth`] or [`require_admin`].
/// Rejects with 401 if neither middleware ran.
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .map(Auth)
            .ok_or(ApiAuthError(AuthErrorKind::NoAccessToken))
    }
}
