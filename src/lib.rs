pub mod api;
pub mod auth;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod rate_limit;

use api::create_api_router;
use auth::{AuthState, CookiePolicy};
use axum::Router;
use db::{Database, UserRepository};
use jwt::{JwtConfig, TokenSettings};
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Signing secrets and lifetimes for access and refresh tokens
    pub tokens: TokenSettings,
    /// Production cookies are Secure with SameSite=None
    pub production: bool,
    /// Per-IP limits for login and registration
    pub rate_limits: RateLimitConfig,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let users: Arc<dyn UserRepository> = Arc::new(config.db.clone());
    create_app_with_repository(config, users)
}

/// Like [`create_app`], but the session middleware resolves refresh tokens
/// through `users` instead of the database.
pub fn create_app_with_repository(
    config: &ServerConfig,
    users: Arc<dyn UserRepository>,
) -> Router {
    let jwt = Arc::new(JwtConfig::new(&config.tokens));
    let cookies = CookiePolicy::for_environment(config.production);
    let auth_state = AuthState::new(jwt, users, cookies);

    create_api_router(config.db.clone(), auth_state, config.rate_limits.clone())
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let pruner = rate_limit::spawn_pruner(config.rate_limits.clone(), rate_limit::PRUNE_INTERVAL);

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let result = axum::serve(listener, make_service).await;

    pruner.abort();
    result
}
