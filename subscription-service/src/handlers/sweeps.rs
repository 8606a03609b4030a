use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::models::SweepReport;
use crate::startup::AppState;

/// Run one expiry sweep. Intended for an external scheduler.
#[tracing::instrument(skip(state))]
pub async fn sweep_expirations(
    State(state): State<AppState>,
) -> Result<Json<SweepReport>, AppError> {
    let report = state.engine.sweeper.sweep_expirations().await?;
    Ok(Json(report))
}
