use thiserror::Error;

#[derive(Debug, Error)]
pub enum LabError {
    #[error("another provisioning operation is already in progress")]
    Busy,

    #[error("deployment not found: {user_id}/{subscription_id}/{workspace}")]
    DeploymentNotFound {
        user_id: String,
        subscription_id: String,
        workspace: String,
    },

    #[error("invalid lab definition: {0}")]
    InvalidLab(String),

    #[error("extend script unavailable: {0}")]
    ScriptUnavailable(String),

    #[error("invalid workspace name: {0:?}")]
    InvalidWorkspace(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("{phase} failed with exit code {code}")]
    PhaseFailed { phase: String, code: i32 },

    #[error("failed to launch {command}: {reason}")]
    ProcessSpawn { command: String, reason: String },

    #[error("provisioning succeeded but status bookkeeping failed: {0}")]
    Bookkeeping(String),

    #[error("action store error: {0}")]
    ActionStore(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LabError {
    /// True for failures detected before any external process is launched.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            LabError::InvalidLab(_) | LabError::ScriptUnavailable(_) | LabError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, LabError>;
