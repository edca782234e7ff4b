//! Cookie-based session authentication.
//!
//! Dual-token system: short-lived access tokens (stateless, never persisted)
//! and longer-lived refresh tokens stored on the user record. When an access
//! token is invalid or expired, the middleware silently renews it from the
//! refresh token and sets the new access token cookie on the response.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod state;
mod types;

pub use cookie::{ACCESS_COOKIE_NAME, CookiePolicy, REFRESH_COOKIE_NAME, SameSite, get_cookie};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{
    Auth, authenticate_request, renew_access_token, require_admin, require_auth,
};
pub use ip::extract_client_ip;
pub use state::AuthState;
pub use types::{AuthOutcome, AuthenticatedUser, Renewal};
