use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::lab::LabDefinition;

// ---------------------------------------------------------------------------
// ActionStatus
// ---------------------------------------------------------------------------

/// Instance-wide busy marker guarded by the action gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStatus {
    pub in_progress: bool,
    pub started_at: Option<DateTime<Utc>>,
    /// Correlates log lines of the claiming operation. `None` while idle.
    #[serde(default)]
    pub operation_id: Option<Uuid>,
}

impl ActionStatus {
    pub fn idle() -> Self {
        Self {
            in_progress: false,
            started_at: None,
            operation_id: None,
        }
    }

    pub fn started_now() -> Self {
        Self {
            in_progress: true,
            started_at: Some(Utc::now()),
            operation_id: Some(Uuid::new_v4()),
        }
    }
}

impl Default for ActionStatus {
    fn default() -> Self {
        Self::idle()
    }
}

// ---------------------------------------------------------------------------
// DeploymentStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeploymentStatus {
    Requested,
    InProgress,
    Applied,
    Failed,
    Destroying,
    Destroyed,
}

impl DeploymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentStatus::Requested => "Requested",
            DeploymentStatus::InProgress => "InProgress",
            DeploymentStatus::Applied => "Applied",
            DeploymentStatus::Failed => "Failed",
            DeploymentStatus::Destroying => "Destroying",
            DeploymentStatus::Destroyed => "Destroyed",
        }
    }

    /// Statuses that mean a provisioning process is (or should be) running.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            DeploymentStatus::InProgress | DeploymentStatus::Destroying
        )
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

/// Identity of a deployment record: at most one record per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeploymentKey {
    pub user_id: String,
    pub subscription_id: String,
    pub workspace: String,
}

impl DeploymentKey {
    pub fn new(
        user_id: impl Into<String>,
        subscription_id: impl Into<String>,
        workspace: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            subscription_id: subscription_id.into(),
            workspace: workspace.into(),
        }
    }
}

impl fmt::Display for DeploymentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.user_id, self.subscription_id, self.workspace
        )
    }
}

/// Wire shape matches the deployment store's JSON field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    #[serde(rename = "deploymentUserId")]
    pub user_id: String,
    #[serde(rename = "deploymentSubscriptionId")]
    pub subscription_id: String,
    #[serde(rename = "deploymentWorkspace")]
    pub workspace: String,
    #[serde(rename = "deploymentStatus")]
    pub status: DeploymentStatus,
    #[serde(rename = "deploymentLastUpdated")]
    pub last_updated: DateTime<Utc>,
    #[serde(rename = "deploymentLab", default, skip_serializing_if = "Option::is_none")]
    pub lab: Option<LabDefinition>,
}

impl Deployment {
    pub fn new(key: &DeploymentKey, status: DeploymentStatus) -> Self {
        Self {
            user_id: key.user_id.clone(),
            subscription_id: key.subscription_id.clone(),
            workspace: key.workspace.clone(),
            status,
            last_updated: Utc::now(),
            lab: None,
        }
    }

    pub fn key(&self) -> DeploymentKey {
        DeploymentKey::new(&self.user_id, &self.subscription_id, &self.workspace)
    }

    /// Move to `status`, stamping `last_updated`.
    pub fn transition(&mut self, status: DeploymentStatus) {
        self.status = status;
        self.last_updated = Utc::now();
    }

    /// Attach a lab, redacting protected script bodies first.
    pub fn with_lab(mut self, lab: &LabDefinition) -> Self {
        self.lab = Some(lab.redacted());
        self
    }
}

// ---------------------------------------------------------------------------
// ToolAction / ScriptMode
// ---------------------------------------------------------------------------

/// Action keyword passed to the provisioning tool wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolAction {
    Init,
    Plan,
    Apply,
    Destroy,
}

impl ToolAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolAction::Init => "init",
            ToolAction::Plan => "plan",
            ToolAction::Apply => "apply",
            ToolAction::Destroy => "destroy",
        }
    }
}

impl fmt::Display for ToolAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of `SCRIPT_MODE` handed to extend scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptMode {
    Apply,
    Destroy,
    Validate,
}

impl ScriptMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ScriptMode::Apply => "apply",
            ScriptMode::Destroy => "destroy",
            ScriptMode::Validate => "validate",
        }
    }
}

impl fmt::Display for ScriptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScriptMode {
    type Err = crate::error::LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apply" => Ok(ScriptMode::Apply),
            "destroy" => Ok(ScriptMode::Destroy),
            "validate" => Ok(ScriptMode::Validate),
            _ => Err(crate::error::LabError::InvalidLab(format!(
                "unknown script mode '{s}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tracking (external bookkeeping)
// ---------------------------------------------------------------------------

/// Which bookkeeping collection a lab reports into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingKind {
    Assignment,
    Challenge,
}

impl TrackingKind {
    pub fn path_segment(self) -> &'static str {
        match self {
            TrackingKind::Assignment => "assignment",
            TrackingKind::Challenge => "challenge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingStatus {
    InProgress,
    Completed,
}

impl TrackingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackingStatus::InProgress => "InProgress",
            TrackingStatus::Completed => "Completed",
        }
    }
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_uses_store_field_names() {
        let key = DeploymentKey::new("alice@contoso.com", "sub-1", "dev");
        let d = Deployment::new(&key, DeploymentStatus::InProgress);
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["deploymentUserId"], "alice@contoso.com");
        assert_eq!(json["deploymentSubscriptionId"], "sub-1");
        assert_eq!(json["deploymentWorkspace"], "dev");
        assert_eq!(json["deploymentStatus"], "InProgress");
        assert!(json.get("deploymentLab").is_none());
    }

    #[test]
    fn transition_stamps_last_updated() {
        let key = DeploymentKey::new("u", "s", "w");
        let mut d = Deployment::new(&key, DeploymentStatus::Requested);
        d.last_updated = Utc::now() - chrono::Duration::hours(3);
        let before = d.last_updated;
        d.transition(DeploymentStatus::Applied);
        assert_eq!(d.status, DeploymentStatus::Applied);
        assert!(d.last_updated > before);
    }

    #[test]
    fn active_statuses() {
        assert!(DeploymentStatus::InProgress.is_active());
        assert!(DeploymentStatus::Destroying.is_active());
        assert!(!DeploymentStatus::Requested.is_active());
        assert!(!DeploymentStatus::Applied.is_active());
    }

    #[test]
    fn script_mode_parses_known_modes() {
        assert_eq!("validate".parse::<ScriptMode>().unwrap(), ScriptMode::Validate);
        assert!("teardown".parse::<ScriptMode>().is_err());
    }

    #[test]
    fn started_status_carries_operation_id() {
        let s = ActionStatus::started_now();
        assert!(s.in_progress);
        assert!(s.started_at.is_some());
        assert!(s.operation_id.is_some());
        assert_eq!(ActionStatus::default(), ActionStatus::idle());
    }

    #[test]
    fn action_status_wire_form_carries_operation_id() {
        let s = ActionStatus::started_now();
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["inProgress"], true);
        assert_eq!(
            json["operationId"],
            serde_json::json!(s.operation_id.unwrap().to_string())
        );
        let back: ActionStatus = serde_json::from_value(json).unwrap();
        assert_eq!(back, s);

        let legacy: ActionStatus =
            serde_json::from_str(r#"{"inProgress":false,"startedAt":null}"#).unwrap();
        assert_eq!(legacy, ActionStatus::idle());
    }
}
