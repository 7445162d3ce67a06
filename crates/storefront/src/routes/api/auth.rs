//! JSON authentication endpoints.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::middleware::clear_current_user;
use crate::models::CurrentUser;
use crate::routes::visitor;
use crate::services::AuthService;
use crate::state::AppState;

/// Credentials for login and registration.
#[derive(Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// The logged-in user.
#[derive(Serialize)]
pub struct UserResponse {
    pub user: CurrentUser,
}

/// `POST /api/auth/register`
#[instrument(skip(state, session, body))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<Credentials>,
) -> Result<impl IntoResponse> {
    let user = AuthService::new(state.pool())
        .register(&body.email, &body.password)
        .await?;
    let user = visitor::log_in(&state, &session, user).await?;
    Ok((StatusCode::CREATED, Json(UserResponse { user })))
}

/// `POST /api/auth/login`
#[instrument(skip(state, session, body))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<Credentials>,
) -> Result<Json<UserResponse>> {
    let user = AuthService::new(state.pool())
        .login(&body.email, &body.password)
        .await?;
    let user = visitor::log_in(&state, &session, user).await?;
    Ok(Json(UserResponse { user }))
}

/// `POST /api/auth/logout`
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Result<StatusCode> {
    clear_current_user(&session)
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;
    Ok(StatusCode::NO_CONTENT)
}
