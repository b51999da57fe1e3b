use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use labrig_core::LabError;

// ---------------------------------------------------------------------------
// AppError — unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(LabError::InvalidLab(msg.into()).into())
    }
}

fn status_for(e: &LabError) -> StatusCode {
    match e {
        LabError::Busy => StatusCode::CONFLICT,
        LabError::DeploymentNotFound { .. } => StatusCode::NOT_FOUND,
        LabError::InvalidLab(_) | LabError::InvalidWorkspace(_) | LabError::Config(_) => {
            StatusCode::BAD_REQUEST
        }
        LabError::ScriptUnavailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LabError::Upstream(_) => StatusCode::BAD_GATEWAY,
        LabError::Bookkeeping(_) => StatusCode::MULTI_STATUS,
        LabError::PhaseFailed { .. }
        | LabError::ProcessSpawn { .. }
        | LabError::ActionStore(_)
        | LabError::Cache(_)
        | LabError::Io(_)
        | LabError::Yaml(_)
        | LabError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let lab_error = self.0.downcast_ref::<LabError>();
        let status = lab_error
            .map(status_for)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // Infrastructure is in place; only the status report is missing.
        let body = if matches!(lab_error, Some(LabError::Bookkeeping(_))) {
            serde_json::json!({ "error": self.0.to_string(), "provisioned": true })
        } else {
            serde_json::json!({ "error": self.0.to_string() })
        };
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %format!("{:#}", self.0), "request failed");
        }
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn busy_maps_to_409() {
        let response = AppError(LabError::Busy.into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn deployment_not_found_maps_to_404() {
        let err = LabError::DeploymentNotFound {
            user_id: "u".into(),
            subscription_id: "s".into(),
            workspace: "w".into(),
        };
        let response = AppError(err.into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_lab_maps_to_400() {
        let response = AppError::bad_request("no id").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn script_unavailable_maps_to_422() {
        let err = LabError::ScriptUnavailable("redacted".into());
        let response = AppError(err.into()).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn upstream_maps_to_502() {
        let err = LabError::Upstream("hub returned 500".into());
        let response = AppError(err.into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn phase_failure_maps_to_500() {
        let err = LabError::PhaseFailed {
            phase: "apply".into(),
            code: 1,
        };
        let response = AppError(err.into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn non_lab_error_maps_to_500() {
        let response = AppError(anyhow::anyhow!("something unexpected")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn bookkeeping_is_207_and_flags_provisioned() {
        let err = LabError::Bookkeeping("hub down".into());
        let response = AppError(err.into()).into_response();
        assert_eq!(response.status(), StatusCode::MULTI_STATUS);
        let body = body_json(response).await;
        assert_eq!(body["provisioned"], true);
        assert!(body["error"].as_str().unwrap().contains("hub down"));
    }

    #[tokio::test]
    async fn body_has_error_field_only() {
        let response = AppError(LabError::Busy.into()).into_response();
        let body = body_json(response).await;
        assert!(body.get("provisioned").is_none());
        assert!(body["error"].as_str().unwrap().contains("already in progress"));
    }
}
