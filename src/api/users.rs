//! User endpoints.
//!
//! - GET `/` - List all users (admin), or `?username=` to look one up
//! - GET `/{id}` - Public profile
//! - DELETE `/{id}` - Delete an account (self, or anyone for admins)
//! - GET/PUT/DELETE `/me` - The caller's account
//! - PUT `/me/password` - Change password

use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{StatusCode, header::SET_COOKIE},
    middleware::{self, Next},
    response::{AppendHeaders, IntoResponse, Response},
    routing::{delete, get, put},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::{ApiError, ResultExt};
use super::password::{hash_password, verify_password};
use crate::auth::{Auth, AuthState, require_admin, require_auth};
use crate::db::{Database, UserRole, UserSummary};

const MAX_PROFILE_TEXT_LENGTH: usize = 500;

#[derive(Clone)]
pub struct UsersState {
    pub db: Database,
    pub auth: AuthState,
}

pub fn router(state: UsersState) -> Router {
    let account_router = Router::new()
        .route("/me", get(me).put(update_me).delete(delete_me))
        .route("/me/password", put(change_password))
        .route("/{id}", delete(delete_user))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            require_auth,
        ));

    let listing_router = Router::new()
        .route("/", get(list_or_lookup))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            admin_unless_lookup,
        ));

    let public_router = Router::new()
        .route("/{id}", get(get_user))
        .with_state(state);

    Router::new()
        .merge(account_router)
        .merge(listing_router)
        .merge(public_router)
}

#[derive(Deserialize)]
struct LookupQuery {
    username: Option<String>,
}

/// A username lookup is public. The full listing requires an admin.
async fn admin_unless_lookup(
    State(auth): State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    let is_lookup = Query::<LookupQuery>::try_from_uri(request.uri())
        .is_ok_and(|Query(query)| query.username.is_some());
    if is_lookup {
        return next.run(request).await;
    }

    require_admin(State(auth), request, next)
        .await
        .into_response()
}

async fn list_or_lookup(
    State(state): State<UsersState>,
    Query(query): Query<LookupQuery>,
) -> Result<Response, ApiError> {
    if let Some(username) = query.username {
        let user = state
            .db
            .users()
            .get_summary_by_username(username.trim())
            .await
            .db_err("Failed to get user")?
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        return Ok(Json(user).into_response());
    }

    let users = state.db.users().list().await.db_err("Failed to list users")?;
    Ok(Json(users).into_response())
}

async fn get_user(
    State(state): State<UsersState>,
    Path(id): Path<i64>,
) -> Result<Json<UserSummary>, ApiError> {
    let user = state
        .db
        .users()
        .get_summary_by_id(id)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(user))
}

/// Reads the account fresh from storage; the token only supplies the id.
async fn me(
    State(state): State<UsersState>,
    Auth(user): Auth,
) -> Result<Json<UserSummary>, ApiError> {
    let stored = state
        .db
        .users()
        .get_summary_by_id(user.id)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(stored))
}

#[derive(Deserialize)]
struct UpdateProfileRequest {
    #[serde(default, alias = "profileText")]
    profile_text: Option<String>,
}

/// Replace the caller's profile text. A missing, null or blank value clears it.
async fn update_me(
    State(state): State<UsersState>,
    Auth(user): Auth,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<UserSummary>, ApiError> {
    let profile_text = payload
        .profile_text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty());

    if profile_text.is_some_and(|text| text.chars().count() > MAX_PROFILE_TEXT_LENGTH) {
        return Err(ApiError::bad_request(
            "Profile text cannot be longer than 500 characters",
        ));
    }

    let users = state.db.users();
    let updated = users
        .update_profile_text(user.id, profile_text)
        .await
        .db_err("Failed to update profile")?;
    if !updated {
        return Err(ApiError::not_found("User not found"));
    }

    info!(user_id = user.id, "Profile updated");

    let stored = users
        .get_summary_by_id(user.id)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(stored))
}

#[derive(Deserialize)]
struct ChangePasswordRequest {
    current_password: Option<String>,
    new_password: Option<String>,
}

async fn change_password(
    State(state): State<UsersState>,
    Auth(user): Auth,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (current, new) = match (payload.current_password, payload.new_password) {
        (Some(current), Some(new)) if !current.is_empty() && !new.is_empty() => (current, new),
        _ => {
            return Err(ApiError::bad_request(
                "Current and new password required",
            ));
        }
    };

    let stored = state
        .db
        .users()
        .get_by_id(user.id)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if !verify_password(current, stored.password_hash).await? {
        warn!(user_id = user.id, "Password change with wrong current password");
        return Err(ApiError::bad_request("Wrong username or password"));
    }

    let password_hash = hash_password(new).await?;

    state
        .db
        .users()
        .update_password(user.id, &password_hash)
        .await
        .db_err("Failed to update password")?;

    info!(user_id = user.id, "Password updated");

    Ok(Json(serde_json::json!({ "message": "Password updated" })))
}

#[derive(Serialize)]
struct DeleteResponse {
    message: &'static str,
}

/// Delete `id` and, when it is the caller's own account, clear both cookies.
async fn delete_account(
    state: &UsersState,
    id: i64,
    own_account: bool,
) -> Result<Response, ApiError> {
    let deleted = state
        .db
        .users()
        .delete(id)
        .await
        .db_err("Failed to delete user")?;

    if !deleted {
        return Err(ApiError::not_found("User not found"));
    }

    let body = Json(DeleteResponse {
        message: "User deleted",
    });

    if !own_account {
        return Ok((StatusCode::OK, body).into_response());
    }

    let [clear_access, clear_refresh] = state.auth.cookies.clear_cookies();
    Ok((
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, clear_access), (SET_COOKIE, clear_refresh)]),
        body,
    )
        .into_response())
}

/// Deletes the caller's account. The stored refresh token goes with the row.
async fn delete_me(
    State(state): State<UsersState>,
    Auth(user): Auth,
) -> Result<Response, ApiError> {
    let response = delete_account(&state, user.id, true).await?;
    info!(user_id = user.id, "User deleted");
    Ok(response)
}

/// Users may delete themselves. Deleting anyone else requires the admin
/// role as currently stored, not as carried in the access token.
async fn delete_user(
    State(state): State<UsersState>,
    Auth(user): Auth,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    if id == user.id {
        let response = delete_account(&state, id, true).await?;
        info!(user_id = id, "User deleted");
        return Ok(response);
    }

    let caller = state
        .db
        .users()
        .get_by_id(user.id)
        .await
        .db_err("Failed to get user")?;

    if !caller.is_some_and(|caller| caller.role == UserRole::Admin) {
        warn!(user_id = user.id, target = id, "Refused to delete another user");
        return Err(ApiError::forbidden("You can only delete your own account"));
    }

    let response = delete_account(&state, id, false).await?;
    info!(user_id = id, admin_id = user.id, "User deleted by admin");
    Ok(response)
}
