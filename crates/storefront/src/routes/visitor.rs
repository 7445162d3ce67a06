//! Per-visitor session state shared by page and API handlers.
//!
//! A guest gets a random cart key on the first add-to-cart; logging in folds
//! that guest cart into the user's cart and drops the key.

use chrono::Utc;
use rand::Rng;
use tower_sessions::Session;
use uuid::Uuid;

use crate::db::carts::CartOwner;
use crate::error::{AppError, Result};
use crate::middleware::set_current_user;
use crate::models::{CurrentUser, User, session_keys};
use crate::state::AppState;

fn session_error(err: tower_sessions::session::Error) -> AppError {
    AppError::Internal(format!("session error: {err}"))
}

async fn guest_key(session: &Session) -> Result<Option<Uuid>> {
    session
        .get::<Uuid>(session_keys::GUEST_CART)
        .await
        .map_err(session_error)
}

/// The cart this visitor already has, if any.
///
/// # Errors
///
/// Returns `AppError::Internal` if the session cannot be read.
pub async fn cart_owner(session: &Session, user: Option<&CurrentUser>) -> Result<Option<CartOwner>> {
    if let Some(user) = user {
        return Ok(Some(CartOwner::User(user.id)));
    }
    Ok(guest_key(session).await?.map(CartOwner::Guest))
}

/// The cart owner for this visitor, creating a guest key when needed.
///
/// # Errors
///
/// Returns `AppError::Internal` if the session cannot be modified.
pub async fn ensure_cart_owner(session: &Session, user: Option<&CurrentUser>) -> Result<CartOwner> {
    if let Some(owner) = cart_owner(session, user).await? {
        return Ok(owner);
    }
    let key = Uuid::new_v4();
    session
        .insert(session_keys::GUEST_CART, key)
        .await
        .map_err(session_error)?;
    Ok(CartOwner::Guest(key))
}

/// GA4 client ID for this visitor, assigned on first use.
///
/// Uses the `<random>.<unix seconds>` shape the GA4 web tag uses.
///
/// # Errors
///
/// Returns `AppError::Internal` if the session cannot be modified.
pub async fn analytics_client_id(session: &Session) -> Result<String> {
    if let Some(id) = session
        .get::<String>(session_keys::ANALYTICS_CLIENT_ID)
        .await
        .map_err(session_error)?
    {
        return Ok(id);
    }
    let id = new_client_id(rand::rng().random::<u32>(), Utc::now().timestamp());
    session
        .insert(session_keys::ANALYTICS_CLIENT_ID, &id)
        .await
        .map_err(session_error)?;
    Ok(id)
}

fn new_client_id(random: u32, timestamp: i64) -> String {
    format!("{random}.{timestamp}")
}

/// Put `user` in the session and merge the guest cart into theirs.
///
/// # Errors
///
/// Returns `AppError::Internal` if the session cannot be modified, or the
/// database error if the cart merge fails.
pub async fn log_in(state: &AppState, session: &Session, user: User) -> Result<CurrentUser> {
    let current = CurrentUser::from(user);

    if let Some(key) = guest_key(session).await? {
        state.carts().merge_on_login(key, current.id).await?;
        session
            .remove::<Uuid>(session_keys::GUEST_CART)
            .await
            .map_err(session_error)?;
    }

    set_current_user(session, &current)
        .await
        .map_err(session_error)?;

    tracing::info!(user_id = %current.id, "User logged in");
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_shape() {
        assert_eq!(new_client_id(42, 1_760_000_000), "42.1760000000");
    }
}
