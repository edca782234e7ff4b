//! Shared state for the session middleware.

use std::sync::Arc;

use super::cookie::CookiePolicy;
use crate::db::UserRepository;
use crate::jwt::JwtConfig;

/// Everything the session middleware needs: token keys, the user repository
/// and the cookie policy. Cheap to clone.
#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<JwtConfig>,
    pub users: Arc<dyn UserRepository>,
    pub cookies: CookiePolicy,
}

impl AuthState {
    pub fn new(jwt: Arc<JwtConfig>, users: Arc<dyn UserRepository>, cookies: CookiePolicy) -> Self {
        Self { jwt, users, cookies }
    }
}
