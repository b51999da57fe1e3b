use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use labrig_core::lab::LabDefinition;
use labrig_core::types::{Deployment, DeploymentStatus};
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::hold_gate;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// GET /api/deployments — the owner's deployments in this subscription.
pub async fn list_deployments(
    State(app): State<AppState>,
) -> Result<Json<Vec<Deployment>>, AppError> {
    let owner = app.orchestrator.owner();
    let deployments = app
        .ledger
        .list(&owner.user_id, &owner.subscription_id)
        .await?;
    Ok(Json(deployments))
}

/// GET /api/deployments/{workspace}
pub async fn get_deployment(
    State(app): State<AppState>,
    Path(workspace): Path<String>,
) -> Result<Json<Deployment>, AppError> {
    let key = app.orchestrator.key(&workspace);
    Ok(Json(app.ledger.get(&key).await?))
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RegisterDeploymentBody {
    pub workspace: String,
    #[serde(default)]
    pub lab: Option<LabDefinition>,
}

/// PUT /api/deployments — register a `Requested` record without provisioning.
///
/// The reaper evicts it if no workflow picks it up in time.
pub async fn register_deployment(
    State(app): State<AppState>,
    Json(body): Json<RegisterDeploymentBody>,
) -> Result<Json<Deployment>, AppError> {
    if body.workspace.trim().is_empty() {
        return Err(AppError::bad_request("workspace must not be empty"));
    }
    let _claim = hold_gate(&app.gate).await?;
    let key = app.orchestrator.key(&body.workspace);
    let mut record = Deployment::new(&key, DeploymentStatus::Requested);
    if let Some(lab) = &body.lab {
        record = record.with_lab(lab);
    }
    app.ledger.upsert(&record).await?;
    Ok(Json(record))
}

/// DELETE /api/deployments/{workspace} — drop the record only; resources stay.
pub async fn delete_deployment(
    State(app): State<AppState>,
    Path(workspace): Path<String>,
) -> Result<StatusCode, AppError> {
    let _claim = hold_gate(&app.gate).await?;
    let key = app.orchestrator.key(&workspace);
    app.ledger.delete(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}
