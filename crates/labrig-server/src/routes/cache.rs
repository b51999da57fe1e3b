use axum::extract::State;
use axum::http::StatusCode;

use crate::error::AppError;
use crate::middleware::hold_gate;
use crate::state::AppState;

/// DELETE /api/cache — drop all reference data; it is rebuilt on demand.
pub async fn reset_cache(State(app): State<AppState>) -> Result<StatusCode, AppError> {
    let _claim = hold_gate(&app.gate).await?;
    app.cache.clear()?;
    tracing::info!("reference cache cleared");
    Ok(StatusCode::NO_CONTENT)
}
