//! Authentication user types.

use serde::Serialize;

use crate::db::{User, UserRole};
use crate::jwt::AccessClaims;

/// Identity attached to a request once the session middleware accepts it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub username: String,
    /// Taken from the token payload when the access token was valid,
    /// from the stored record when it was renewed.
    pub role: Option<UserRole>,
}

impl From<AccessClaims> for AuthenticatedUser {
    fn from(claims: AccessClaims) -> Self {
        Self {
            id: claims.id,
            username: claims.name,
            role: claims.role,
        }
    }
}

impl From<&User> for AuthenticatedUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: Some(user.role),
        }
    }
}

/// Result of a successful authentication.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub user: AuthenticatedUser,
    /// New access token cookie to set (only when the token was renewed)
    pub new_access_cookie: Option<String>,
}

/// A freshly minted access token and the record it was minted from.
#[derive(Debug, Clone)]
pub struct Renewal {
    pub user: User,
    pub access_cookie: String,
}
