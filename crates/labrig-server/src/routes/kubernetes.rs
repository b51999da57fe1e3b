use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct KubernetesVersionsResponse {
    pub supported: Vec<String>,
    pub default: String,
}

/// GET /api/kubernetes/versions — supported versions and the current default.
pub async fn get_versions(
    State(app): State<AppState>,
) -> Result<Json<KubernetesVersionsResponse>, AppError> {
    let supported = app.versions.supported().await?;
    let default = app.versions.default_version().await?;
    Ok(Json(KubernetesVersionsResponse { supported, default }))
}
