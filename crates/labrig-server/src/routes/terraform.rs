//! Provisioning routes. Every handler here runs behind the action gate
//! middleware and hands its claim to the workflow task.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use labrig_core::lab::LabDefinition;
use labrig_core::types::{Deployment, ScriptMode};

use crate::error::AppError;
use crate::middleware::{run_gated, GateClaim};
use crate::orchestrator::DeploymentRequest;
use crate::state::AppState;

/// POST /api/terraform/init
pub async fn init(
    State(app): State<AppState>,
    Extension(claim): Extension<GateClaim>,
) -> Result<StatusCode, AppError> {
    let orchestrator = app.orchestrator.clone();
    run_gated(claim, async move { orchestrator.init().await }).await?;
    Ok(StatusCode::OK)
}

/// POST /api/terraform/plan
pub async fn plan(
    State(app): State<AppState>,
    Extension(claim): Extension<GateClaim>,
    Json(lab): Json<LabDefinition>,
) -> Result<StatusCode, AppError> {
    let orchestrator = app.orchestrator.clone();
    run_gated(claim, async move { orchestrator.plan(lab).await }).await?;
    Ok(StatusCode::OK)
}

/// POST /api/terraform/apply
pub async fn apply(
    State(app): State<AppState>,
    Extension(claim): Extension<GateClaim>,
    Json(req): Json<DeploymentRequest>,
) -> Result<Json<Deployment>, AppError> {
    let orchestrator = app.orchestrator.clone();
    let record = run_gated(claim, async move { orchestrator.apply(req).await }).await?;
    Ok(Json(record))
}

/// POST /api/terraform/destroy
pub async fn destroy(
    State(app): State<AppState>,
    Extension(claim): Extension<GateClaim>,
    Json(req): Json<DeploymentRequest>,
) -> Result<StatusCode, AppError> {
    let orchestrator = app.orchestrator.clone();
    run_gated(claim, async move { orchestrator.destroy(req).await }).await?;
    Ok(StatusCode::OK)
}

/// POST /api/terraform/extend/{mode} — `apply`, `destroy` or `validate`.
pub async fn extend(
    State(app): State<AppState>,
    Extension(claim): Extension<GateClaim>,
    Path(mode): Path<String>,
    Json(lab): Json<LabDefinition>,
) -> Result<StatusCode, AppError> {
    let mode: ScriptMode = mode.parse()?;
    let orchestrator = app.orchestrator.clone();
    run_gated(claim, async move { orchestrator.extend(lab, mode).await }).await?;
    Ok(StatusCode::OK)
}
