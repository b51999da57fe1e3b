//! Tool-state blob lease cleanup.
//!
//! The provisioning tool holds a blob lease while it runs. A workflow that
//! dies mid-phase leaves the lease behind and blocks the next run on the same
//! workspace, so the reaper breaks it after evicting the record.

use std::path::PathBuf;

use async_trait::async_trait;
use labrig_core::config::ServerConfig;
use labrig_core::{LabError, Result};
use tokio::process::Command;

/// Blob holding the tool state for `workspace`.
pub fn state_blob_name(workspace: &str) -> String {
    if workspace == "default" {
        "terraform.tfstate".to_string()
    } else {
        format!("terraform.tfstateenv:{workspace}")
    }
}

#[async_trait]
pub trait LeaseBreaker: Send + Sync {
    /// Break the state lease of `workspace`. A blob without a lease, or no
    /// blob at all, counts as success.
    async fn break_lease(&self, workspace: &str) -> Result<()>;
}

/// Outcomes the storage service reports for an already-clean blob.
const ALREADY_CLEAN: &[&str] = &[
    "There is currently no lease on the blob",
    "LeaseNotPresentWithLeaseOperation",
    "BlobNotFound",
    "The specified blob does not exist",
];

fn already_clean(stderr: &str) -> bool {
    ALREADY_CLEAN.iter().any(|marker| stderr.contains(marker))
}

/// Breaks leases through the `az` command line.
pub struct AzCliLeaseBreaker {
    account_name: Option<String>,
    container: String,
}

impl AzCliLeaseBreaker {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            account_name: config.storage_account_name.clone(),
            container: config.state_backend.lease_container.clone(),
        }
    }

    fn az(&self) -> Result<PathBuf> {
        which::which("az").map_err(|e| LabError::ProcessSpawn {
            command: "az".into(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl LeaseBreaker for AzCliLeaseBreaker {
    async fn break_lease(&self, workspace: &str) -> Result<()> {
        let Some(account) = &self.account_name else {
            tracing::debug!(workspace, "no storage account configured, skipping lease break");
            return Ok(());
        };
        let blob = state_blob_name(workspace);
        let output = Command::new(self.az()?)
            .args(["storage", "blob", "lease", "break"])
            .args(["--account-name", account])
            .args(["--container-name", &self.container])
            .args(["--blob-name", &blob])
            .output()
            .await?;

        if output.status.success() {
            tracing::info!(workspace, blob = %blob, "state lease broken");
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if already_clean(&stderr) {
            tracing::debug!(workspace, blob = %blob, "state blob has no lease");
            return Ok(());
        }
        Err(LabError::Upstream(format!(
            "break lease on {blob}: {}",
            stderr.trim()
        )))
    }
}
