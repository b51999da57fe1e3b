use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use labrig_core::lab::LabDefinition;

use crate::error::AppError;
use crate::middleware::hold_gate;
use crate::state::AppState;

/// GET /api/lab — the current lab, with protected scripts redacted.
pub async fn get_lab(State(app): State<AppState>) -> Result<Json<LabDefinition>, AppError> {
    let lab = app.current_lab.get().await?;
    Ok(Json(lab.redacted()))
}

/// PUT /api/lab — replace the current lab.
pub async fn put_lab(
    State(app): State<AppState>,
    Json(lab): Json<LabDefinition>,
) -> Result<Json<LabDefinition>, AppError> {
    let _claim = hold_gate(&app.gate).await?;
    let stored = app.current_lab.put(lab).await?;
    Ok(Json(stored.redacted()))
}

/// DELETE /api/lab — forget the current lab; the next read regenerates the default.
pub async fn delete_lab(State(app): State<AppState>) -> Result<StatusCode, AppError> {
    let _claim = hold_gate(&app.gate).await?;
    app.current_lab.delete()?;
    Ok(StatusCode::NO_CONTENT)
}
