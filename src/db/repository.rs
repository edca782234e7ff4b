//! Persistence capability required by the session middleware.
//!
//! The middleware only ever needs three operations, so it depends on this
//! trait rather than on [`Database`] directly. Tests substitute an in-memory
//! implementation.

use async_trait::async_trait;

use super::{Database, User};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Repository unavailable: {0}")]
    Unavailable(String),
    #[error("User {0} not found")]
    NotFound(i64),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find the user whose persisted refresh token equals `token`.
    async fn find_user_by_refresh_token(&self, token: &str)
    -> Result<Option<User>, RepositoryError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError>;

    /// Overwrite the user's single refresh token slot. Fails with
    /// [`RepositoryError::NotFound`] when no such user exists.
    async fn update_user_refresh_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: i64,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
impl UserRepository for Database {
    async fn find_user_by_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<User>, RepositoryError> {
        Ok(self.users().get_by_refresh_token(token).await?)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.users().get_by_username(username).await?)
    }

    async fn update_user_refresh_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: i64,
    ) -> Result<(), RepositoryError> {
        if self
            .users()
            .set_refresh_token(user_id, token, expires_at)
            .await?
        {
            Ok(())
        } else {
            Err(RepositoryError::NotFound(user_id))
        }
    }
}
