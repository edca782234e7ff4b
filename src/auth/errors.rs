//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Why a request was rejected by the session middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    NoAccessToken,
    NoRefreshToken,
    /// No user holds the presented refresh token, or its expiry is unset.
    InvalidRefreshToken,
    RefreshTokenExpired,
    AdminRequired,
    /// Storage or token signing failed while renewing.
    Internal,
}

impl AuthErrorKind {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthErrorKind::NoAccessToken
            | AuthErrorKind::NoRefreshToken
            | AuthErrorKind::InvalidRefreshToken => StatusCode::UNAUTHORIZED,
            AuthErrorKind::RefreshTokenExpired | AuthErrorKind::AdminRequired => {
                StatusCode::FORBIDDEN
            }
            AuthErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AuthErrorKind::NoAccessToken => "No access token",
            AuthErrorKind::NoRefreshToken => "No refresh token",
            AuthErrorKind::InvalidRefreshToken => "Invalid refresh token",
            AuthErrorKind::RefreshTokenExpired => "Refresh token expired",
            AuthErrorKind::AdminRequired => "Admin access required",
            AuthErrorKind::Internal => "Internal server error",
        }
    }
}

/// Terminal rejection from the session middleware. Renders as JSON and
/// leaves the client's cookies untouched.
#[derive(Debug)]
pub struct ApiAuthError(pub AuthErrorKind);

impl From<AuthErrorKind> for ApiAuthError {
    fn from(kind: AuthErrorKind) -> Self {
        Self(kind)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    message: &'static str,
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        (
            self.0.status_code(),
            Json(ErrorResponse {
                message: self.0.message(),
            }),
        )
            .into_response()
    }
}
