use axum::extract::State;
use axum::Json;
use labrig_core::types::ActionStatus;

use crate::error::AppError;
use crate::state::AppState;

/// GET /status — liveness.
pub async fn get_status() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "OK",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/actionstatus — whether a provisioning workflow holds the gate.
pub async fn get_action_status(
    State(app): State<AppState>,
) -> Result<Json<ActionStatus>, AppError> {
    let gate = app.gate.clone();
    let status = tokio::task::spawn_blocking(move || gate.status())
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))?;
    Ok(Json(status))
}

/// DELETE /api/actionstatus — force-release the gate.
///
/// Recovery path for a holder that died without releasing; the gate has no
/// lease of its own.
pub async fn reset_action_status(
    State(app): State<AppState>,
) -> Result<Json<ActionStatus>, AppError> {
    let gate = app.gate.clone();
    let status = tokio::task::spawn_blocking(move || {
        let before = gate.status();
        if before.in_progress {
            tracing::warn!(operation_id = ?before.operation_id, "action gate force-released");
        }
        gate.release();
        gate.status()
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))?;
    Ok(Json(status))
}
