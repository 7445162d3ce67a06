//! One-off checkout sweep.
//!
//! The server runs the same sweep every five minutes; this command exists
//! for when it is not running, or to clear a backlog after an outage.

use chrono::Utc;
use thiserror::Error;

use nestling_storefront::error::AppError;
use nestling_storefront::state::{AppState, StateError};

use super::{SetupError, connect};

/// Errors that can occur during the sweep.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("Failed to initialize services: {0}")]
    State(#[from] StateError),

    #[error("Sweep failed: {0}")]
    Sweep(#[from] AppError),
}

/// Expire lapsed checkout sessions and release their reserved stock.
///
/// # Errors
///
/// Returns `SweepError` if setup fails or the sweep cannot read sessions.
pub async fn sweep() -> Result<(), SweepError> {
    let (config, pool) = connect().await?;
    let state = AppState::new(config, pool)?;

    let report = state.orders().sweep_expired_sessions(Utc::now()).await?;
    tracing::info!(
        "Examined {} sessions: {} expired, {} skipped",
        report.examined,
        report.expired,
        report.skipped
    );
    Ok(())
}
