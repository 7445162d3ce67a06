//! Admin user management commands.
//!
//! Accounts are created through the normal registration page; this command
//! only grants the admin role.
//!
//! # Usage
//!
//! ```bash
//! nestling admin promote -e owner@example.com
//! ```

use thiserror::Error;

use nestling_core::{Email, UserRole};
use nestling_storefront::db::{RepositoryError, UserRepository};

use super::{SetupError, connect};

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("No account exists with email: {0}")]
    UserNotFound(String),

    #[error("Database error: {0}")]
    Repository(RepositoryError),
}

/// Give an existing account the admin role.
///
/// # Errors
///
/// Returns `AdminError` if the email is invalid or no account uses it.
pub async fn promote(email: &str) -> Result<(), AdminError> {
    let parsed = Email::parse(email).map_err(|_| AdminError::InvalidEmail(email.to_owned()))?;
    let (_, pool) = connect().await?;

    let user = UserRepository::new(&pool)
        .set_role(&parsed, UserRole::Admin)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AdminError::UserNotFound(email.to_owned()),
            other => AdminError::Repository(other),
        })?;

    tracing::info!("Promoted {} (user {}) to admin", parsed, user.id);
    Ok(())
}
