//! Authentication route handlers.
//!
//! Handles login, registration and logout with local email/password
//! accounts. Errors are passed back to the form as `?error=` messages.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::AppError;
use crate::filters;
use crate::middleware::{OptionalAuth, clear_current_user};
use crate::models::{CurrentUser, User};
use crate::routes::{redirect_with, visitor};
use crate::services::AuthService;
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

// =============================================================================
// Query Types
// =============================================================================

/// Query parameters for error/success display.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub user: Option<CurrentUser>,
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub user: Option<CurrentUser>,
    pub error: Option<String>,
}

/// Where a freshly logged-in user lands.
fn landing(user: &CurrentUser) -> Redirect {
    if user.is_admin() {
        Redirect::to("/admin")
    } else {
        Redirect::to("/cart")
    }
}

async fn start_session(
    state: &AppState,
    session: &Session,
    result: Result<User, AppError>,
    form_path: &str,
) -> Response {
    let outcome = match result {
        Ok(user) => visitor::log_in(state, session, user).await,
        Err(e) => Err(e),
    };
    match outcome {
        Ok(user) => landing(&user).into_response(),
        Err(e) => {
            if e.status().is_server_error() {
                tracing::error!(error = %e, "Authentication failed");
            } else {
                tracing::info!(error = %e, "Authentication rejected");
            }
            redirect_with(form_path, "error", &e.public_message()).into_response()
        }
    }
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page.
pub async fn login_page(
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<MessageQuery>,
) -> Response {
    if let Some(user) = &user {
        return landing(user).into_response();
    }
    LoginTemplate {
        user,
        error: query.error,
        success: query.success,
    }
    .into_response()
}

/// Handle login form submission.
#[instrument(skip(state, session, form))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let result = AuthService::new(state.pool())
        .login(&form.email, &form.password)
        .await
        .map_err(AppError::from);
    start_session(&state, &session, result, "/auth/login").await
}

// =============================================================================
// Registration Routes
// =============================================================================

/// Display the registration page.
pub async fn register_page(
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<MessageQuery>,
) -> Response {
    if let Some(user) = &user {
        return landing(user).into_response();
    }
    RegisterTemplate {
        user,
        error: query.error,
    }
    .into_response()
}

/// Handle registration form submission.
#[instrument(skip(state, session, form))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Response {
    if form.password != form.password_confirm {
        return redirect_with("/auth/register", "error", "Passwords do not match.")
            .into_response();
    }
    let result = AuthService::new(state.pool())
        .register(&form.email, &form.password)
        .await
        .map_err(AppError::from);
    start_session(&state, &session, result, "/auth/register").await
}

// =============================================================================
// Logout
// =============================================================================

/// Handle logout.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Redirect {
    if let Err(e) = clear_current_user(&session).await {
        tracing::error!(error = %e, "Failed to clear session");
    }
    Redirect::to("/")
}
