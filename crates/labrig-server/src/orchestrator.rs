//! Provisioning workflows.
//!
//! `apply` runs `Apply → ExtendApply`; `destroy` runs
//! `ExtendDestroy → Destroy`. Phases run strictly one after another, each as
//! a child process drained into the shared [`LogStream`]. The deployment
//! record is moved through its statuses as the workflow progresses.
//!
//! Callers hold the action gate for the whole workflow; nothing here claims
//! or releases it.

use std::sync::Arc;

use labrig_core::lab::LabDefinition;
use labrig_core::types::{
    Deployment, DeploymentKey, DeploymentStatus, ScriptMode, ToolAction, TrackingStatus,
};
use labrig_core::{LabError, Result};
use serde::Deserialize;

use crate::hub::{ProtectedLabSource, StatusReporter};
use crate::kubernetes::KubernetesVersions;
use crate::labs::CurrentLab;
use crate::ledger::DeploymentLedger;
use crate::logstream::LogStream;
use crate::subprocess;
use crate::tool::{ToolCommands, DEFAULT_WORKSPACE};
use crate::workspaces::Workspaces;

fn default_workspace() -> String {
    DEFAULT_WORKSPACE.to_string()
}

/// Body of apply and destroy requests.
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentRequest {
    #[serde(default = "default_workspace")]
    pub workspace: String,
    pub lab: LabDefinition,
}

/// Identity the workflows run as.
#[derive(Debug, Clone)]
pub struct Owner {
    pub user_id: String,
    pub subscription_id: String,
}

pub struct Orchestrator {
    owner: Owner,
    tools: ToolCommands,
    logs: LogStream,
    ledger: Arc<DeploymentLedger>,
    workspaces: Arc<Workspaces>,
    versions: Arc<KubernetesVersions>,
    current_lab: Arc<CurrentLab>,
    labs: Arc<dyn ProtectedLabSource>,
    reporter: Arc<dyn StatusReporter>,
}

pub struct OrchestratorParts {
    pub owner: Owner,
    pub tools: ToolCommands,
    pub logs: LogStream,
    pub ledger: Arc<DeploymentLedger>,
    pub workspaces: Arc<Workspaces>,
    pub versions: Arc<KubernetesVersions>,
    pub current_lab: Arc<CurrentLab>,
    pub labs: Arc<dyn ProtectedLabSource>,
    pub reporter: Arc<dyn StatusReporter>,
}

impl Orchestrator {
    pub fn new(parts: OrchestratorParts) -> Self {
        Self {
            owner: parts.owner,
            tools: parts.tools,
            logs: parts.logs,
            ledger: parts.ledger,
            workspaces: parts.workspaces,
            versions: parts.versions,
            current_lab: parts.current_lab,
            labs: parts.labs,
            reporter: parts.reporter,
        }
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn key(&self, workspace: &str) -> DeploymentKey {
        DeploymentKey::new(
            &self.owner.user_id,
            &self.owner.subscription_id,
            workspace,
        )
    }

    // -----------------------------------------------------------------------
    // Workflows
    // -----------------------------------------------------------------------

    /// Initialise the tool against the current lab.
    pub async fn init(&self) -> Result<()> {
        self.logs.reset();
        self.workspaces.invalidate();
        let mut lab = self.current_lab.get().await?;
        self.run_tool(ToolAction::Init, &mut lab, None).await
    }

    pub async fn plan(&self, mut lab: LabDefinition) -> Result<()> {
        self.logs.reset();
        self.run_tool(ToolAction::Plan, &mut lab, None).await
    }

    /// Provision `req.lab` into `req.workspace`. Returns the final record.
    ///
    /// A bookkeeping failure after successful provisioning is reported as
    /// [`LabError::Bookkeeping`] with the record already `Applied`.
    pub async fn apply(&self, req: DeploymentRequest) -> Result<Deployment> {
        self.logs.reset();
        let key = self.key(&req.workspace);
        let mut lab = req.lab;
        let mut record = Deployment::new(&key, DeploymentStatus::InProgress).with_lab(&lab);
        self.ledger.upsert(&record).await?;
        self.workspaces.invalidate();
        tracing::info!(key = %key, lab_id = %lab.id, "apply started");

        match self.apply_phases(&mut lab, &key.workspace).await {
            Ok(deferred) => {
                record = record.with_lab(&lab);
                record.transition(DeploymentStatus::Applied);
                self.ledger.upsert(&record).await.map_err(|e| {
                    LabError::Bookkeeping(format!("could not record applied deployment: {e}"))
                })?;
                tracing::info!(key = %key, "apply finished");
                match deferred {
                    Some(e) => Err(e),
                    None => Ok(record),
                }
            }
            Err(e) => {
                self.mark_failed(&mut record, &e).await;
                Err(e)
            }
        }
    }

    /// Returns a bookkeeping error to surface once the record is written.
    async fn apply_phases(
        &self,
        lab: &mut LabDefinition,
        workspace: &str,
    ) -> Result<Option<LabError>> {
        self.run_tool(ToolAction::Apply, lab, Some(workspace)).await?;

        let mut deferred = None;
        if let Some(kind) = lab.tracking() {
            if let Err(e) = self
                .reporter
                .report(kind, &self.owner.user_id, &lab.id, TrackingStatus::InProgress)
                .await
            {
                tracing::error!(lab_id = %lab.id, error = %e, "could not mark lab in progress");
                deferred = Some(LabError::Bookkeeping(format!(
                    "lab provisioned but its progress could not be recorded: {e}"
                )));
            }
        }

        self.run_extend(lab, ScriptMode::Apply, Some(workspace))
            .await?;
        Ok(deferred)
    }

    /// Tear down `req.workspace` and remove its record.
    pub async fn destroy(&self, req: DeploymentRequest) -> Result<()> {
        self.logs.reset();
        let key = self.key(&req.workspace);
        let mut lab = req.lab;
        let mut record = match self.ledger.get(&key).await {
            Ok(existing) => existing,
            Err(LabError::DeploymentNotFound { .. }) => {
                Deployment::new(&key, DeploymentStatus::Destroying).with_lab(&lab)
            }
            Err(e) => return Err(e),
        };
        record.transition(DeploymentStatus::Destroying);
        self.ledger.upsert(&record).await?;
        self.workspaces.invalidate();
        tracing::info!(key = %key, lab_id = %lab.id, "destroy started");

        let outcome = async {
            self.run_extend(&mut lab, ScriptMode::Destroy, Some(&key.workspace))
                .await?;
            self.run_tool(ToolAction::Destroy, &mut lab, Some(&key.workspace))
                .await
        }
        .await;

        match outcome {
            Ok(()) => {
                self.ledger.delete(&key).await.map_err(|e| {
                    LabError::Bookkeeping(format!("could not remove destroyed deployment: {e}"))
                })?;
                tracing::info!(key = %key, "destroy finished");
                Ok(())
            }
            Err(e) => {
                self.mark_failed(&mut record, &e).await;
                Err(e)
            }
        }
    }

    /// Run the lab's extend script on its own.
    pub async fn extend(&self, mut lab: LabDefinition, mode: ScriptMode) -> Result<()> {
        self.logs.reset();
        self.run_extend(&mut lab, mode, None).await
    }

    async fn mark_failed(&self, record: &mut Deployment, cause: &LabError) {
        tracing::error!(key = %record.key(), error = %cause, "workflow failed");
        record.transition(DeploymentStatus::Failed);
        if let Err(e) = self.ledger.upsert(record).await {
            tracing::error!(key = %record.key(), error = %e, "could not record failed deployment");
        }
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    async fn run_tool(
        &self,
        action: ToolAction,
        lab: &mut LabDefinition,
        workspace: Option<&str>,
    ) -> Result<()> {
        self.versions.reconcile(lab).await?;
        let cmd = self.tools.action(action, &lab.template, workspace)?;
        tracing::info!(phase = %action, lab_id = %lab.id, "phase started");
        subprocess::run_logged(cmd, action.as_str(), &self.logs).await
    }

    async fn run_extend(
        &self,
        lab: &mut LabDefinition,
        mode: ScriptMode,
        workspace: Option<&str>,
    ) -> Result<()> {
        self.versions.reconcile(lab).await?;
        let script = if lab.is_redacted() {
            self.protected_script(lab).await?
        } else {
            lab.decoded_script()?
        };

        if script.trim().is_empty() {
            tracing::info!(lab_id = %lab.id, mode = %mode, "no extend script");
        } else {
            let cmd = self.tools.extend(&script, mode, &lab.template, workspace)?;
            tracing::info!(phase = "extend", mode = %mode, lab_id = %lab.id, "phase started");
            subprocess::run_logged(cmd, &format!("extend {mode}"), &self.logs).await?;
        }

        if mode == ScriptMode::Validate {
            if let Some(kind) = lab.tracking() {
                self.reporter
                    .report(kind, &self.owner.user_id, &lab.id, TrackingStatus::Completed)
                    .await
                    .map_err(|e| {
                        LabError::Bookkeeping(format!(
                            "validation passed but completion could not be recorded: {e}"
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Decoded script body from the protected source.
    async fn protected_script(&self, lab: &LabDefinition) -> Result<String> {
        let authoritative = self.labs.protected_lab(&lab.lab_type, &lab.id).await?;
        if authoritative.is_redacted() || authoritative.extend_script.trim().is_empty() {
            return Err(LabError::ScriptUnavailable(format!(
                "protected source returned no script for lab '{}'",
                lab.id
            )));
        }
        let script = authoritative.decoded_script()?;
        if script.trim().is_empty() {
            return Err(LabError::ScriptUnavailable(format!(
                "protected script for lab '{}' is empty",
                lab.id
            )));
        }
        Ok(script)
    }
}
