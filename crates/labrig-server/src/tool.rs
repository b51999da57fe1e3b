//! Command lines and environment for the provisioning tool wrappers.
//!
//! Every child gets its environment set per command; the server's own
//! environment is never mutated.

use std::path::PathBuf;

use labrig_core::config::ServerConfig;
use labrig_core::lab::TfvarConfig;
use labrig_core::tfvars;
use labrig_core::types::{ScriptMode, ToolAction};
use labrig_core::Result;
use tokio::process::Command;

/// Workspace the tool uses when none is named.
pub const DEFAULT_WORKSPACE: &str = "default";

/// Workspace operations understood by `scripts/workspaces.sh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceOp {
    New,
    Select,
    Delete,
}

impl WorkspaceOp {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkspaceOp::New => "new",
            WorkspaceOp::Select => "select",
            WorkspaceOp::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolCommands {
    root_dir: PathBuf,
    base_env: Vec<(String, String)>,
}

impl ToolCommands {
    pub fn new(config: &ServerConfig) -> Self {
        let backend = &config.state_backend;
        let mut base_env = vec![
            ("terraform_directory".to_string(), "tf".to_string()),
            (
                "root_directory".to_string(),
                config.root_dir.to_string_lossy().into_owned(),
            ),
            ("subscription_id".to_string(), backend.subscription_id.clone()),
            (
                "resource_group_name".to_string(),
                backend.resource_group_name.clone(),
            ),
            (
                "storage_account_name".to_string(),
                backend.storage_account_name.clone(),
            ),
            ("container_name".to_string(), backend.container_name.clone()),
            ("tf_state_file_name".to_string(), config.state_file_name()),
        ];
        if config.service_principal.enabled {
            let sp = &config.service_principal;
            base_env.extend([
                ("ARM_CLIENT_ID".to_string(), sp.client_id.clone()),
                ("ARM_CLIENT_SECRET".to_string(), sp.client_secret.clone()),
                (
                    "ARM_SUBSCRIPTION_ID".to_string(),
                    config.identity.subscription_id.clone(),
                ),
                ("ARM_TENANT_ID".to_string(), sp.tenant_id.clone()),
            ]);
        }
        Self {
            root_dir: config.root_dir.clone(),
            base_env,
        }
    }

    pub fn base_env(&self) -> &[(String, String)] {
        &self.base_env
    }

    fn command(&self, program: impl Into<PathBuf>) -> Command {
        let mut cmd = Command::new(program.into());
        cmd.current_dir(&self.root_dir).envs(self.base_env.iter().cloned());
        cmd
    }

    /// Environment for one workflow step: template variables plus the
    /// selected workspace.
    fn workflow_env(
        cmd: &mut Command,
        template: &TfvarConfig,
        workspace: Option<&str>,
    ) -> Result<()> {
        cmd.envs(tfvars::tool_variables(template)?);
        if let Some(ws) = workspace {
            cmd.env("TF_WORKSPACE", ws);
        }
        Ok(())
    }

    /// Wrapper scripts run under bash, so they need no exec bit.
    fn script(&self, name: &str) -> Command {
        let mut cmd = self.command("bash");
        cmd.arg(self.root_dir.join("scripts").join(name));
        cmd
    }

    /// `scripts/terraform.sh <action>`.
    pub fn action(
        &self,
        action: ToolAction,
        template: &TfvarConfig,
        workspace: Option<&str>,
    ) -> Result<Command> {
        let mut cmd = self.script("terraform.sh");
        cmd.arg(action.as_str());
        Self::workflow_env(&mut cmd, template, workspace)?;
        Ok(cmd)
    }

    /// Run already-decoded extend script text under bash.
    pub fn extend(
        &self,
        script: &str,
        mode: ScriptMode,
        template: &TfvarConfig,
        workspace: Option<&str>,
    ) -> Result<Command> {
        let mut cmd = self.command("bash");
        cmd.arg("-c").arg(script).env("SCRIPT_MODE", mode.as_str());
        Self::workflow_env(&mut cmd, template, workspace)?;
        Ok(cmd)
    }

    /// `scripts/workspaces.sh list`.
    pub fn list_workspaces(&self) -> Command {
        let mut cmd = self.script("workspaces.sh");
        cmd.arg("list");
        cmd
    }

    /// `scripts/workspaces.sh <op> <name>`.
    pub fn workspace(&self, op: WorkspaceOp, name: &str) -> Command {
        let mut cmd = self.script("workspaces.sh");
        cmd.arg(op.as_str()).arg(name);
        cmd
    }

    /// `terraform state list` in the selected workspace.
    pub fn list_resources(&self) -> Command {
        let mut cmd = self.command("terraform");
        cmd.args(["state", "list"])
            .current_dir(self.root_dir.join("tf"));
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labrig_core::lab::ResourceGroup;
    use std::ffi::OsStr;

    fn env_of<'a>(cmd: &'a Command, key: &str) -> Option<&'a OsStr> {
        cmd.as_std()
            .get_envs()
            .find(|(k, _)| *k == OsStr::new(key))
            .and_then(|(_, v)| v)
    }

    fn config() -> ServerConfig {
        let mut c = ServerConfig {
            root_dir: PathBuf::from("/srv/lab"),
            ..ServerConfig::default()
        };
        c.identity.user_alias = "alice".into();
        c.identity.subscription_id = "user-sub".into();
        c.state_backend.subscription_id = "hub-sub".into();
        c.state_backend.resource_group_name = "hub-rg".into();
        c.state_backend.storage_account_name = "hubsa".into();
        c
    }

    #[test]
    fn action_carries_env_contract() {
        let tools = ToolCommands::new(&config());
        let template = TfvarConfig {
            resource_group: Some(ResourceGroup {
                location: "East US".into(),
            }),
            ..TfvarConfig::default()
        };
        let cmd = tools
            .action(ToolAction::Plan, &template, Some("dev"))
            .unwrap();
        let std = cmd.as_std();
        assert_eq!(std.get_program(), OsStr::new("bash"));
        assert_eq!(
            std.get_args().collect::<Vec<_>>(),
            vec![OsStr::new("/srv/lab/scripts/terraform.sh"), OsStr::new("plan")]
        );
        assert_eq!(env_of(&cmd, "terraform_directory"), Some(OsStr::new("tf")));
        assert_eq!(env_of(&cmd, "subscription_id"), Some(OsStr::new("hub-sub")));
        assert_eq!(
            env_of(&cmd, "container_name"),
            Some(OsStr::new("repro-project-tf-state-files"))
        );
        assert_eq!(
            env_of(&cmd, "tf_state_file_name"),
            Some(OsStr::new("alice-terraform.tfstate"))
        );
        assert_eq!(
            env_of(&cmd, "TF_VAR_resource_group"),
            Some(OsStr::new(r#"{"location":"East US"}"#))
        );
        assert_eq!(env_of(&cmd, "TF_VAR_kubernetes_clusters"), None);
        assert_eq!(env_of(&cmd, "TF_WORKSPACE"), Some(OsStr::new("dev")));
        assert_eq!(env_of(&cmd, "ARM_CLIENT_ID"), None);
    }

    #[test]
    fn service_principal_adds_arm_variables() {
        let mut c = config();
        c.service_principal.enabled = true;
        c.service_principal.client_id = "cid".into();
        c.service_principal.client_secret = "secret".into();
        c.service_principal.tenant_id = "tenant".into();
        let cmd = ToolCommands::new(&c).list_workspaces();
        assert_eq!(env_of(&cmd, "ARM_CLIENT_ID"), Some(OsStr::new("cid")));
        assert_eq!(env_of(&cmd, "ARM_SUBSCRIPTION_ID"), Some(OsStr::new("user-sub")));
        assert_eq!(env_of(&cmd, "ARM_TENANT_ID"), Some(OsStr::new("tenant")));
    }

    #[test]
    fn workspace_ops_pass_the_name_through() {
        let tools = ToolCommands::new(&config());
        for (op, verb) in [
            (WorkspaceOp::New, "new"),
            (WorkspaceOp::Select, "select"),
            (WorkspaceOp::Delete, "delete"),
        ] {
            let cmd = tools.workspace(op, "qa");
            assert_eq!(
                cmd.as_std().get_args().collect::<Vec<_>>(),
                vec![
                    OsStr::new("/srv/lab/scripts/workspaces.sh"),
                    OsStr::new(verb),
                    OsStr::new("qa")
                ]
            );
            assert_eq!(env_of(&cmd, "tf_state_file_name"), Some(OsStr::new("alice-terraform.tfstate")));
        }
    }

    #[test]
    fn resources_run_in_the_tool_directory() {
        let cmd = ToolCommands::new(&config()).list_resources();
        let std = cmd.as_std();
        assert_eq!(std.get_program(), OsStr::new("terraform"));
        assert_eq!(
            std.get_args().collect::<Vec<_>>(),
            vec![OsStr::new("state"), OsStr::new("list")]
        );
        assert_eq!(
            std.get_current_dir(),
            Some(std::path::Path::new("/srv/lab/tf"))
        );
        assert_eq!(env_of(&cmd, "storage_account_name"), Some(OsStr::new("hubsa")));
    }

    #[test]
    fn extend_sets_script_mode() {
        let tools = ToolCommands::new(&config());
        let cmd = tools
            .extend("echo hi", ScriptMode::Validate, &TfvarConfig::default(), None)
            .unwrap();
        assert_eq!(cmd.as_std().get_program(), OsStr::new("bash"));
        assert_eq!(env_of(&cmd, "SCRIPT_MODE"), Some(OsStr::new("validate")));
        assert_eq!(env_of(&cmd, "TF_WORKSPACE"), None);
    }
}
