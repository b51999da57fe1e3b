use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};

use crate::error::AppError;
use crate::middleware::{run_gated, GateClaim};
use crate::state::AppState;

/// GET /api/workspaces — tool workspaces, served from cache when possible.
pub async fn list_workspaces(State(app): State<AppState>) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(app.workspaces.list().await?))
}

/// GET /api/resources — resources tracked in the selected workspace.
pub async fn list_resources(State(app): State<AppState>) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(app.workspaces.resources().await?))
}

/// PUT /api/workspaces/{name} — create a workspace.
pub async fn add_workspace(
    State(app): State<AppState>,
    Extension(claim): Extension<GateClaim>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    let workspaces = app.workspaces.clone();
    run_gated(claim, async move { workspaces.add(&name).await }).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/workspaces/{name}/select
pub async fn select_workspace(
    State(app): State<AppState>,
    Extension(claim): Extension<GateClaim>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    let workspaces = app.workspaces.clone();
    run_gated(claim, async move { workspaces.select(&name).await }).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/workspaces/{name}
pub async fn delete_workspace(
    State(app): State<AppState>,
    Extension(claim): Extension<GateClaim>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    let workspaces = app.workspaces.clone();
    run_gated(claim, async move { workspaces.delete(&name).await }).await?;
    Ok(StatusCode::NO_CONTENT)
}
