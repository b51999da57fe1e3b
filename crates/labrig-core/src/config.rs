use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LabError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "labrig.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn error(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Who this server instance provisions for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Principal name; also the owner of deployments created here.
    pub user_id: String,
    /// Short alias used to name the tool state file.
    pub user_alias: String,
    pub subscription_id: String,
}

/// Where the provisioning tool keeps its remote state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateBackendConfig {
    pub subscription_id: String,
    pub resource_group_name: String,
    pub storage_account_name: String,
    pub container_name: String,
    /// Container whose blob leases the reaper breaks.
    pub lease_container: String,
}

impl Default for StateBackendConfig {
    fn default() -> Self {
        Self {
            subscription_id: String::new(),
            resource_group_name: String::new(),
            storage_account_name: String::new(),
            container_name: "repro-project-tf-state-files".into(),
            lease_container: "tfstate".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub url: String,
    pub auth_token: Option<String>,
    pub protected_lab_secret: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicePrincipalConfig {
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    pub interval_secs: u64,
    /// Age after which `InProgress`/`Destroying` records count as abandoned.
    pub stale_after_secs: u64,
    /// Age after which a never-claimed `Requested` record is abandoned.
    pub requested_stale_after_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            stale_after_secs: 2 * 60 * 60,
            requested_stale_after_secs: 15 * 60,
        }
    }
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesConfig {
    pub supported_versions: Vec<String>,
    /// Falls back to the newest supported version when unset.
    pub default_version: Option<String>,
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory holding `scripts/` and the tool's `tf/` working directory.
    pub root_dir: PathBuf,
    pub identity: IdentityConfig,
    pub state_backend: StateBackendConfig,
    pub hub: HubConfig,
    pub service_principal: ServicePrincipalConfig,
    pub reaper: ReaperConfig,
    pub kubernetes: KubernetesConfig,
    /// Persist the action gate here; in-memory when unset.
    pub action_store_path: Option<PathBuf>,
    /// Storage account holding per-workspace state blobs.
    pub storage_account_name: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            identity: IdentityConfig::default(),
            state_backend: StateBackendConfig::default(),
            hub: HubConfig {
                timeout_secs: default_timeout_secs(),
                ..HubConfig::default()
            },
            service_principal: ServicePrincipalConfig::default(),
            reaper: ReaperConfig::default(),
            kubernetes: KubernetesConfig::default(),
            action_store_path: None,
            storage_account_name: None,
        }
    }
}

impl ServerConfig {
    /// Read `path` if it exists (defaults otherwise), then apply the environment.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let data = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&data)?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay values from the environment variables the deployment scripts export.
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |target: &mut String, key: &str| {
            if let Some(v) = var(key).filter(|v| !v.is_empty()) {
                *target = v;
            }
        };

        if let Some(root) = var("ROOT_DIR").filter(|v| !v.is_empty()) {
            self.root_dir = PathBuf::from(root);
        }
        set(&mut self.hub.url, "ACTLABS_HUB_URL");
        set(&mut self.identity.user_id, "ARM_USER_PRINCIPAL_NAME");
        set(&mut self.identity.user_alias, "USER_ALIAS");
        set(&mut self.identity.subscription_id, "AZURE_SUBSCRIPTION_ID");
        set(
            &mut self.state_backend.subscription_id,
            "ACTLABS_HUB_SUBSCRIPTION_ID",
        );
        set(
            &mut self.state_backend.resource_group_name,
            "ACTLABS_HUB_RESOURCE_GROUP_NAME",
        );
        set(
            &mut self.state_backend.storage_account_name,
            "ACTLABS_HUB_STORAGE_ACCOUNT_NAME",
        );
        set(&mut self.hub.protected_lab_secret, "PROTECTED_LAB_SECRET");
        set(&mut self.service_principal.client_id, "AZURE_CLIENT_ID");
        set(&mut self.service_principal.client_secret, "AZURE_CLIENT_SECRET");
        set(&mut self.service_principal.tenant_id, "AZURE_TENANT_ID");

        if let Some(token) = var("ACTLABS_AUTH_TOKEN").filter(|v| !v.is_empty()) {
            self.hub.auth_token = Some(token);
        }
        if let Some(name) = var("STORAGE_ACCOUNT_NAME").filter(|v| !v.is_empty()) {
            self.storage_account_name = Some(name);
        }
        if let Some(flag) = var("USE_SERVICE_PRINCIPAL").filter(|v| !v.is_empty()) {
            self.service_principal.enabled = flag == "true";
        }
        if let Some(secs) = var("HTTP_REQUEST_TIMEOUT_SECONDS").filter(|v| !v.is_empty()) {
            self.hub.timeout_secs = secs.parse().map_err(|_| {
                LabError::Config(format!(
                    "HTTP_REQUEST_TIMEOUT_SECONDS must be a whole number, got '{secs}'"
                ))
            })?;
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.hub.timeout_secs)
    }

    /// Name of the tool's remote state file for this instance.
    pub fn state_file_name(&self) -> String {
        format!("{}-terraform.tfstate", self.identity.user_alias)
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.root_dir.join("scripts")
    }

    /// Check for missing values. `Error`-level findings block `serve`.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut findings = Vec::new();
        let required = [
            (&self.identity.user_id, "identity.user_id (ARM_USER_PRINCIPAL_NAME)"),
            (&self.identity.user_alias, "identity.user_alias (USER_ALIAS)"),
            (
                &self.identity.subscription_id,
                "identity.subscription_id (AZURE_SUBSCRIPTION_ID)",
            ),
            (&self.hub.url, "hub.url (ACTLABS_HUB_URL)"),
            (
                &self.state_backend.subscription_id,
                "state_backend.subscription_id (ACTLABS_HUB_SUBSCRIPTION_ID)",
            ),
            (
                &self.state_backend.resource_group_name,
                "state_backend.resource_group_name (ACTLABS_HUB_RESOURCE_GROUP_NAME)",
            ),
            (
                &self.state_backend.storage_account_name,
                "state_backend.storage_account_name (ACTLABS_HUB_STORAGE_ACCOUNT_NAME)",
            ),
        ];
        for (value, name) in required {
            if value.trim().is_empty() {
                findings.push(ConfigWarning::error(format!("{name} is not set")));
            }
        }

        if self.service_principal.enabled {
            let sp = &self.service_principal;
            if sp.client_id.is_empty() || sp.client_secret.is_empty() || sp.tenant_id.is_empty() {
                findings.push(ConfigWarning::error(
                    "service principal enabled but client id, secret or tenant is missing",
                ));
            }
        }
        if self.hub.auth_token.is_none() {
            findings.push(ConfigWarning::warning(
                "hub.auth_token (ACTLABS_AUTH_TOKEN) is not set; hub calls will be unauthenticated",
            ));
        }
        if self.hub.protected_lab_secret.is_empty() {
            findings.push(ConfigWarning::warning(
                "hub.protected_lab_secret is not set; protected labs cannot be resolved",
            ));
        }
        if self.kubernetes.supported_versions.is_empty() {
            findings.push(ConfigWarning::warning(
                "kubernetes.supported_versions is empty; every cluster version will be rejected",
            ));
        }
        if self.storage_account_name.is_none() {
            findings.push(ConfigWarning::warning(
                "storage_account_name is not set; reaper lease cleanup is disabled",
            ));
        }
        if self.reaper.interval_secs == 0 {
            findings.push(ConfigWarning::error("reaper.interval_secs must be > 0"));
        }
        if !self.scripts_dir().is_dir() {
            findings.push(ConfigWarning::warning(format!(
                "scripts directory {} does not exist",
                self.scripts_dir().display()
            )));
        }
        findings
    }
}
