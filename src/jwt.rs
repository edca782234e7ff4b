//! JWT token generation and validation.
//!
//! Access and refresh tokens are signed with separate secrets. Both carry the
//! same `{ name, id, role }` payload; refresh tokens add a random `jti` so that
//! two logins within the same second still produce distinct tokens.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::db::UserRole;

/// Default access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);

/// Default refresh token lifetime: 1 hour.
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(60 * 60);

/// JWT claims for access tokens (stateless, never persisted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Username
    pub name: String,
    /// Database user ID
    pub id: i64,
    /// User role. Older tokens may carry `null`.
    pub role: Option<UserRole>,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// JWT claims for refresh tokens (persisted on the user record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub jti: String,
    pub name: String,
    pub id: i64,
    pub role: Option<UserRole>,
    pub iat: u64,
    pub exp: u64,
}

/// Secrets and lifetimes for token signing, loaded once at startup.
#[derive(Clone)]
pub struct TokenSettings {
    pub access_secret: Vec<u8>,
    pub refresh_secret: Vec<u8>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("access_secret", &"[REDACTED]")
            .field("refresh_secret", &"[REDACTED]")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    access_encoding_key: EncodingKey,
    access_decoding_key: DecodingKey,
    refresh_encoding_key: EncodingKey,
    access_ttl: u64,
    refresh_ttl: u64,
}

/// Result of generating an access token.
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    /// The JWT token string
    pub token: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Result of generating a refresh token.
#[derive(Debug, Clone)]
pub struct RefreshTokenResult {
    pub token: String,
    pub jti: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds), persisted alongside the token
    pub expires_at: u64,
    pub duration: u64,
}

impl JwtConfig {
    pub fn new(settings: &TokenSettings) -> Self {
        Self {
            access_encoding_key: EncodingKey::from_secret(&settings.access_secret),
            access_decoding_key: DecodingKey::from_secret(&settings.access_secret),
            refresh_encoding_key: EncodingKey::from_secret(&settings.refresh_secret),
            access_ttl: settings.access_ttl.as_secs(),
            refresh_ttl: settings.refresh_ttl.as_secs(),
        }
    }

    /// Generate an access token for a user.
    pub fn generate_access_token(
        &self,
        user_id: i64,
        username: &str,
        role: UserRole,
    ) -> Result<AccessTokenResult, JwtError> {
        let now = now_secs()?;
        let exp = now + self.access_ttl;

        let claims = AccessClaims {
            name: username.to_string(),
            id: user_id,
            role: Some(role),
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.access_encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(AccessTokenResult {
            token,
            expires_at: exp,
            duration: self.access_ttl,
        })
    }

    /// Generate a refresh token for a user.
    /// The caller is responsible for persisting `token` and `expires_at`.
    pub fn generate_refresh_token(
        &self,
        user_id: i64,
        username: &str,
        role: UserRole,
    ) -> Result<RefreshTokenResult, JwtError> {
        let now = now_secs()?;

        let jti = uuid::Uuid::new_v4().to_string();
        let exp = now + self.refresh_ttl;

        let claims = RefreshClaims {
            jti: jti.clone(),
            name: username.to_string(),
            id: user_id,
            role: Some(role),
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.refresh_encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(RefreshTokenResult {
            token,
            jti,
            issued_at: now,
            expires_at: exp,
            duration: self.refresh_ttl,
        })
    }

    /// Validate and decode an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let token_data =
            jsonwebtoken::decode::<AccessClaims>(token, &self.access_decoding_key, &validation)
                .map_err(JwtError::Decoding)?;

        Ok(token_data.claims)
    }
}

/// Current Unix time in seconds.
pub fn now_secs() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Error decoding the token (bad signature, malformed, or expired)
    Decoding(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::TimeError => write!(f, "System time error"),
        }
    }
}

impl std::error::Error for JwtError {}
