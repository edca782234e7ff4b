//! CLI argument parsing, validation, and startup helpers.

use std::time::Duration;

use crate::ServerConfig;
use crate::api::BCRYPT_COST;
use crate::db::{Database, UserRole};
use crate::jwt::{DEFAULT_ACCESS_TTL, DEFAULT_REFRESH_TTL, TokenSettings};
use crate::rate_limit::RateLimitConfig;
use clap::Parser;
use thiserror::Error;
use tracing::{error, info};

const MIN_SECRET_LENGTH: usize = 32;

const ACCESS_SECRET_ENV: &str = "ACCESS_TOKEN_SECRET";
const REFRESH_SECRET_ENV: &str = "REFRESH_TOKEN_SECRET";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

/// Header set by a trusted reverse proxy that carries the client address.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientIpHeader {
    /// Last entry of `X-Forwarded-For`
    XForwardedFor,
    /// `X-Real-IP`
    XRealIp,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "purple-auth", about = "Purple API with cookie session authentication")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3001")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "purple.db")]
    pub database: String,

    /// Deployment environment. Production cookies are Secure with SameSite=None
    #[arg(short, long, env = "APP_ENV", value_enum, default_value = "development")]
    pub environment: Environment,

    /// Path to file containing the access token secret. Prefer ACCESS_TOKEN_SECRET
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer REFRESH_TOKEN_SECRET
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Access token lifetime, e.g. "15m", "900s" or "900"
    #[arg(long, env = "ACCESS_TOKEN_TTL", default_value = "15m", value_parser = parse_duration)]
    pub access_ttl: Duration,

    /// Refresh token lifetime, must be at least the access token lifetime
    #[arg(long, env = "REFRESH_TOKEN_TTL", default_value = "1h", value_parser = parse_duration)]
    pub refresh_ttl: Duration,

    /// Create an admin user on startup from ADMIN_USERNAME and ADMIN_PASSWORD
    #[arg(long)]
    pub create_admin: bool,

    #[arg(long, env = "ADMIN_USERNAME", hide = true)]
    pub admin_username: Option<String>,

    #[arg(long, env = "ADMIN_PASSWORD", hide = true, hide_env_values = true)]
    pub admin_password: Option<String>,

    /// Take the client IP for rate limiting from this proxy header. Only
    /// enable behind a reverse proxy that sets it; clients can forge it otherwise
    #[arg(long, env = "CLIENT_IP_HEADER", value_enum)]
    pub client_ip_header: Option<ClientIpHeader>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Startup configuration errors. Any of these stops the process before the
/// listener is bound.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{env} is required. Set the environment variable (recommended) or use {flag}")]
    MissingSecret {
        env: &'static str,
        flag: &'static str,
    },

    #[error("Failed to read secret file {path}: {source}")]
    SecretFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{env} is shorter than {min} characters. Use a longer secret")]
    SecretTooShort { env: &'static str, min: usize },

    #[error("Refresh token lifetime ({refresh:?}) is shorter than access token lifetime ({access:?})")]
    RefreshShorterThanAccess { access: Duration, refresh: Duration },

    #[error("--create-admin requires ADMIN_USERNAME and ADMIN_PASSWORD")]
    MissingAdminCredentials,

    #[error("Failed to create admin user: {0}")]
    AdminStorage(#[from] sqlx::Error),

    #[error("Failed to hash admin password: {0}")]
    AdminPassword(#[from] bcrypt::BcryptError),
}

/// Parse a lifetime such as `30s`, `15m`, `1h`, `7d` or bare seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (digits, multiplier) = match s.char_indices().last() {
        Some((i, 's')) => (&s[..i], 1),
        Some((i, 'm')) => (&s[..i], 60),
        Some((i, 'h')) => (&s[..i], 60 * 60),
        Some((i, 'd')) => (&s[..i], 24 * 60 * 60),
        Some(_) => (s, 1),
        None => return Err("Duration cannot be empty".to_string()),
    };

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("Invalid duration: {}", s))?;

    if value == 0 {
        return Err(format!("Duration must be greater than zero: {}", s));
    }

    value
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("Duration is too large: {}", s))
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Read a secret from `env`, falling back to `file`. The environment variable
/// is cleared after reading.
///
/// # Safety
///
/// No other thread may read or write the environment while this runs.
unsafe fn read_secret(
    env: &'static str,
    flag: &'static str,
    file: Option<&str>,
) -> Result<String, ConfigError> {
    let secret = if let Ok(secret) = std::env::var(env) {
        // SAFETY: the caller guarantees no other thread touches the environment.
        unsafe { std::env::remove_var(env) };
        secret
    } else if let Some(path) = file {
        std::fs::read_to_string(path)
            .map(|content| content.trim().to_string())
            .map_err(|source| ConfigError::SecretFile {
                path: path.to_string(),
                source,
            })?
    } else {
        return Err(ConfigError::MissingSecret { env, flag });
    };

    validate_secret(env, secret)
}

fn validate_secret(env: &'static str, secret: String) -> Result<String, ConfigError> {
    if secret.len() < MIN_SECRET_LENGTH {
        return Err(ConfigError::SecretTooShort {
            env,
            min: MIN_SECRET_LENGTH,
        });
    }
    Ok(secret)
}

/// Load both signing secrets and validate the lifetimes. The secret
/// environment variables are removed once read.
///
/// # Safety
///
/// Must be called while the process is single threaded, before any async
/// runtime or other thread is started.
pub unsafe fn load_token_settings(args: &Args) -> Result<TokenSettings, ConfigError> {
    // SAFETY: forwarded from this function's contract.
    let access_secret = unsafe {
        read_secret(
            ACCESS_SECRET_ENV,
            "--access-secret-file",
            args.access_secret_file.as_deref(),
        )
    }?;
    // SAFETY: as above.
    let refresh_secret = unsafe {
        read_secret(
            REFRESH_SECRET_ENV,
            "--refresh-secret-file",
            args.refresh_secret_file.as_deref(),
        )
    }?;

    token_settings(access_secret, refresh_secret, args.access_ttl, args.refresh_ttl)
}

fn token_settings(
    access_secret: String,
    refresh_secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
) -> Result<TokenSettings, ConfigError> {
    if refresh_ttl < access_ttl {
        return Err(ConfigError::RefreshShorterThanAccess {
            access: access_ttl,
            refresh: refresh_ttl,
        });
    }

    if access_ttl != DEFAULT_ACCESS_TTL || refresh_ttl != DEFAULT_REFRESH_TTL {
        info!(?access_ttl, ?refresh_ttl, "Using custom token lifetimes");
    }

    Ok(TokenSettings {
        access_secret: access_secret.into_bytes(),
        refresh_secret: refresh_secret.into_bytes(),
        access_ttl,
        refresh_ttl,
    })
}

/// Handle the --create-admin flag: create the admin, or promote an existing
/// account with that username.
pub async fn handle_create_admin(
    db: &Database,
    username: Option<&str>,
    password: Option<&str>,
) -> Result<(), ConfigError> {
    let (Some(username), Some(password)) = (username, password) else {
        return Err(ConfigError::MissingAdminCredentials);
    };
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(ConfigError::MissingAdminCredentials);
    }

    match db.users().get_by_username(username).await? {
        Some(existing) if existing.role == UserRole::Admin => {
            info!(username = %existing.username, "Admin user already exists");
        }
        Some(existing) => {
            db.users().set_role(existing.id, UserRole::Admin).await?;
            info!(username = %existing.username, "Existing user promoted to admin");
        }
        None => {
            let password_hash = bcrypt::hash(password, BCRYPT_COST)?;
            let id = db
                .users()
                .create(username, &password_hash, UserRole::Admin)
                .await?;
            info!(user_id = id, username = %username, "Admin user created");
        }
    }

    Ok(())
}

/// Build ServerConfig from validated arguments.
pub fn build_config(db: Database, tokens: TokenSettings, args: &Args) -> ServerConfig {
    if let Some(header) = args.client_ip_header {
        info!(header = header.header_name(), "Trusting proxy header for client IP");
    }

    ServerConfig {
        db,
        tokens,
        production: args.environment == Environment::Production,
        rate_limits: RateLimitConfig::default().with_client_ip_header(args.client_ip_header),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
