//! Tool workspaces: cached listing, management and the resources tracked in
//! the selected workspace.

use std::sync::Arc;

use labrig_core::cache::{self, Cache};
use labrig_core::{LabError, Result};
use tokio::process::Command;

use crate::tool::{ToolCommands, WorkspaceOp};

pub struct Workspaces {
    tools: ToolCommands,
    cache: Arc<dyn Cache>,
}

/// One name per line; the current workspace is marked with `*`.
pub fn parse_listing(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Names go to the tool as a single argument, so only shape is checked.
fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('-') || name.chars().any(char::is_whitespace) {
        return Err(LabError::InvalidWorkspace(name.to_string()));
    }
    Ok(())
}

/// Run a short tool command and return its stdout.
async fn capture(mut cmd: Command, phase: &str) -> Result<String> {
    let output = cmd.output().await?;
    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        tracing::warn!(
            phase,
            exit_code = code,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "workspace command failed"
        );
        return Err(LabError::PhaseFailed {
            phase: phase.to_string(),
            code,
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

impl Workspaces {
    pub fn new(tools: ToolCommands, cache: Arc<dyn Cache>) -> Self {
        Self { tools, cache }
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        self.cached_lines(cache::WORKSPACES_KEY, || self.tools.list_workspaces(), "workspaces")
            .await
    }

    /// Resource addresses in the tool state of the selected workspace.
    pub async fn resources(&self) -> Result<Vec<String>> {
        self.cached_lines(cache::RESOURCES_KEY, || self.tools.list_resources(), "resources")
            .await
    }

    pub async fn add(&self, name: &str) -> Result<()> {
        self.manage(WorkspaceOp::New, name).await
    }

    pub async fn select(&self, name: &str) -> Result<()> {
        self.manage(WorkspaceOp::Select, name).await
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.manage(WorkspaceOp::Delete, name).await
    }

    async fn manage(&self, op: WorkspaceOp, name: &str) -> Result<()> {
        check_name(name)?;
        let phase = format!("workspace {}", op.as_str());
        let outcome = capture(self.tools.workspace(op, name), &phase).await;
        // The tool may have changed state even when it reports failure.
        self.invalidate();
        outcome?;
        tracing::info!(workspace = name, op = op.as_str(), "workspace updated");
        Ok(())
    }

    async fn cached_lines(
        &self,
        key: &str,
        command: impl FnOnce() -> Command,
        phase: &str,
    ) -> Result<Vec<String>> {
        match cache::get_json::<Vec<String>>(self.cache.as_ref(), key) {
            Ok(Some(hit)) => return Ok(hit),
            Ok(None) => {}
            Err(e) => tracing::warn!(key, error = %e, "cache read failed"),
        }

        let lines = parse_listing(&capture(command(), phase).await?);
        if let Err(e) = cache::set_json(self.cache.as_ref(), key, &lines) {
            tracing::warn!(key, error = %e, "cache write failed");
        }
        Ok(lines)
    }

    /// Drop the cached listing and resources; the next read asks the tool again.
    pub fn invalidate(&self) {
        for key in [cache::WORKSPACES_KEY, cache::RESOURCES_KEY] {
            if let Err(e) = self.cache.delete(key) {
                tracing::error!(key, error = %e, "workspace cache invalidation failed");
            }
        }
    }
}
