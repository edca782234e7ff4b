mod auth;
mod error;
mod password;
mod users;

use axum::{Json, Router, routing::get};

use crate::auth::AuthState;
use crate::db::Database;
use crate::rate_limit::RateLimitConfig;

pub use auth::AuthRoutesState;
pub use error::{ApiError, ResultExt};
pub use password::BCRYPT_COST;
pub use users::UsersState;

/// Create the API router.
pub fn create_api_router(
    db: Database,
    auth_state: AuthState,
    rate_limits: RateLimitConfig,
) -> Router {
    let auth_routes_state = auth::AuthRoutesState {
        db: db.clone(),
        auth: auth_state.clone(),
    };

    let users_state = users::UsersState {
        db,
        auth: auth_state,
    };

    Router::new()
        .route("/", get(health))
        .nest("/auth", auth::router(auth_routes_state, rate_limits))
        .nest("/users", users::router(users_state))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "message": "Purple API is running",
    }))
}
