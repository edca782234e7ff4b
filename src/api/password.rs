//! Password hashing for the account endpoints.
//!
//! bcrypt is deliberately slow, so both operations run on tokio's blocking
//! pool instead of a runtime worker thread.

use super::error::{ApiError, ResultExt};

/// bcrypt cost factor for stored password hashes.
pub const BCRYPT_COST: u32 = 10;

pub(super) async fn hash_password(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .internal_err("Password hashing task failed")?
        .internal_err("Failed to hash password")
}

/// `Ok(false)` on mismatch. A malformed stored hash is a server error.
pub(super) async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .internal_err("Password verification task failed")?
        .internal_err("Failed to verify password")
}
