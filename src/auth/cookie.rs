//! Cookie parsing and `Set-Cookie` construction for session tokens.

use axum::http::header;

/// Cookie name for the access token.
pub const ACCESS_COOKIE_NAME: &str = "accessToken";

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                let value = value.trim();
                if value.is_empty() {
                    return None;
                }
                return Some(value);
            }
        }
    }
    None
}

/// Cross-site attributes applied to every session cookie.
///
/// Production deployments serve the frontend from another origin, so cookies
/// must be `SameSite=None` and therefore `Secure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    pub secure: bool,
    pub same_site: SameSite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    None,
}

impl SameSite {
    fn as_str(&self) -> &'static str {
        match self {
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

impl CookiePolicy {
    pub fn production() -> Self {
        Self {
            secure: true,
            same_site: SameSite::None,
        }
    }

    pub fn development() -> Self {
        Self {
            secure: false,
            same_site: SameSite::Lax,
        }
    }

    pub fn for_environment(production: bool) -> Self {
        if production {
            Self::production()
        } else {
            Self::development()
        }
    }

    fn build(&self, name: &str, value: &str, max_age: u64) -> String {
        let secure = if self.secure { "; Secure" } else { "" };
        format!(
            "{}={}; HttpOnly; SameSite={}; Path=/; Max-Age={}{}",
            name,
            value,
            self.same_site.as_str(),
            max_age,
            secure
        )
    }

    pub fn access_cookie(&self, token: &str, max_age: u64) -> String {
        self.build(ACCESS_COOKIE_NAME, token, max_age)
    }

    pub fn refresh_cookie(&self, token: &str, max_age: u64) -> String {
        self.build(REFRESH_COOKIE_NAME, token, max_age)
    }

    /// Cookies that clear both session tokens on the client.
    pub fn clear_cookies(&self) -> [String; 2] {
        [
            self.build(ACCESS_COOKIE_NAME, "", 0),
            self.build(REFRESH_COOKIE_NAME, "", 0),
        ]
    }
}
