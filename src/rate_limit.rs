//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password
//! guessing and signup spam.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::auth::extract_client_ip;
use crate::cli::ClientIpHeader;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Key used when no proxy header is configured and the connection address
/// is not attached to the request.
const UNKNOWN_CLIENT: &str = "unknown";

/// How often idle per-IP entries are dropped from the limiters.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    pub login: Arc<IpLimiter>,
    pub register: Arc<IpLimiter>,
    /// Proxy header to key on. `None` keys on the connection address.
    pub client_ip_header: Option<ClientIpHeader>,
}

impl RateLimitConfig {
    /// Login: `login_per_sec` sustained with bursts of `login_burst`.
    /// Register: `register_per_min` per minute.
    pub fn new(login_per_sec: u32, login_burst: u32, register_per_min: u32) -> Self {
        let one = NonZeroU32::MIN;
        let login_per_sec = NonZeroU32::new(login_per_sec).unwrap_or(one);
        let login_burst = NonZeroU32::new(login_burst).unwrap_or(one);
        let register_per_min = NonZeroU32::new(register_per_min).unwrap_or(one);

        Self {
            login: Arc::new(RateLimiter::keyed(
                Quota::per_second(login_per_sec).allow_burst(login_burst),
            )),
            register: Arc::new(RateLimiter::keyed(Quota::per_minute(register_per_min))),
            client_ip_header: None,
        }
    }

    pub fn with_client_ip_header(mut self, header: Option<ClientIpHeader>) -> Self {
        self.client_ip_header = header;
        self
    }

    /// Drop entries for clients whose buckets have fully refilled.
    pub fn retain_recent(&self) {
        self.login.retain_recent();
        self.register.retain_recent();
    }

    /// Number of clients currently tracked across both limiters.
    pub fn tracked_clients(&self) -> usize {
        self.login.len() + self.register.len()
    }
}

/// Spawn a background task that prunes idle limiter entries every `interval`.
pub fn spawn_pruner(config: RateLimitConfig, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            config.retain_recent();
            config.login.shrink_to_fit();
            config.register.shrink_to_fit();
            debug!(tracked = config.tracked_clients(), "Pruned rate limiter state");
        }
    })
}

impl Default for RateLimitConfig {
    /// Login: 5 attempts in a burst, then 1 per second. Register: 3 per minute.
    fn default() -> Self {
        Self::new(1, 5, 3)
    }
}

fn client_key(config: &RateLimitConfig, request: &Request) -> Result<String, Response> {
    match extract_client_ip(request, config.client_ip_header) {
        Ok(ip) => Ok(ip.unwrap_or_else(|| UNKNOWN_CLIENT.to_string())),
        Err(reason) => {
            warn!(reason, "Unable to determine client IP");
            Err(ApiError::forbidden("Unable to determine client IP").into_response())
        }
    }
}

/// Middleware for rate limiting login.
pub async fn rate_limit_login(
    State(config): State<RateLimitConfig>,
    request: Request,
    next: Next,
) -> Response {
    let ip = match client_key(&config, &request) {
        Ok(ip) => ip,
        Err(response) => return response,
    };

    match config.login.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, "Login rate limit exceeded");
            ApiError::too_many_requests(
                "Too many login attempts. Please wait before trying again.",
            )
            .into_response()
        }
    }
}

/// Middleware for rate limiting registration.
pub async fn rate_limit_register(
    State(config): State<RateLimitConfig>,
    request: Request,
    next: Next,
) -> Response {
    let ip = match client_key(&config, &request) {
        Ok(ip) => ip,
        Err(response) => return response,
    };

    match config.register.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, "Registration rate limit exceeded");
            ApiError::too_many_requests("Too many signup attempts. Please wait before trying again.")
                .into_response()
        }
    }
}
