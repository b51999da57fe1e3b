use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// GET /api/logs — everything the current (or last) workflow printed so far.
pub async fn get_logs(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "logs": app.logs.read() }))
}
