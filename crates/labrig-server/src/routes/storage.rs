use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::error::AppError;
use crate::middleware::hold_gate;
use crate::state::AppState;

/// PUT /api/storage/lease/{workspace} — break a leftover state lease by hand.
pub async fn break_lease(
    State(app): State<AppState>,
    Path(workspace): Path<String>,
) -> Result<StatusCode, AppError> {
    let _claim = hold_gate(&app.gate).await?;
    app.leases.break_lease(&workspace).await?;
    Ok(StatusCode::NO_CONTENT)
}
