use std::sync::Arc;

use labrig_core::cache::{Cache, MemoryCache};
use labrig_core::config::ServerConfig;
use labrig_core::gate::{ActionGate, ActionStatusStore, MemoryActionStore, RedbActionStore};
use labrig_core::Result;

use crate::hub::{DeploymentStore, HubClient, ProtectedLabSource, StatusReporter};
use crate::kubernetes::{ConfiguredVersions, KubernetesVersions, VersionCatalog};
use crate::labs::CurrentLab;
use crate::ledger::DeploymentLedger;
use crate::logstream::LogStream;
use crate::orchestrator::{Orchestrator, OrchestratorParts, Owner};
use crate::reaper::Reaper;
use crate::storage::{AzCliLeaseBreaker, LeaseBreaker};
use crate::tool::ToolCommands;
use crate::workspaces::Workspaces;

/// External collaborators the server is wired to.
pub struct Backends {
    pub action_store: Arc<dyn ActionStatusStore>,
    pub cache: Arc<dyn Cache>,
    pub deployments: Arc<dyn DeploymentStore>,
    pub protected_labs: Arc<dyn ProtectedLabSource>,
    pub reporter: Arc<dyn StatusReporter>,
    pub versions: Arc<dyn VersionCatalog>,
    pub leases: Arc<dyn LeaseBreaker>,
}

impl Backends {
    /// Production wiring: hub over HTTP, `az` for leases, redb for the gate
    /// when a path is configured.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let hub = Arc::new(HubClient::new(config)?);
        let action_store: Arc<dyn ActionStatusStore> = match &config.action_store_path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Arc::new(RedbActionStore::open(path)?)
            }
            None => Arc::new(MemoryActionStore::new()),
        };
        Ok(Self {
            action_store,
            cache: Arc::new(MemoryCache::new()),
            deployments: hub.clone(),
            protected_labs: hub.clone(),
            reporter: hub,
            versions: Arc::new(ConfiguredVersions::new(config.kubernetes.clone())),
            leases: Arc::new(AzCliLeaseBreaker::new(config)),
        })
    }
}

/// Shared application state passed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub gate: ActionGate,
    pub logs: LogStream,
    pub cache: Arc<dyn Cache>,
    pub ledger: Arc<DeploymentLedger>,
    pub workspaces: Arc<Workspaces>,
    pub versions: Arc<KubernetesVersions>,
    pub current_lab: Arc<CurrentLab>,
    pub orchestrator: Arc<Orchestrator>,
    pub leases: Arc<dyn LeaseBreaker>,
}

impl AppState {
    pub fn new(config: ServerConfig, backends: Backends) -> Self {
        let owner = Owner {
            user_id: config.identity.user_id.clone(),
            subscription_id: config.identity.subscription_id.clone(),
        };
        let tools = ToolCommands::new(&config);
        let logs = LogStream::new();
        let gate = ActionGate::new(backends.action_store);
        let cache = backends.cache;

        let ledger = Arc::new(DeploymentLedger::new(backends.deployments, cache.clone()));
        ledger.track(&owner.user_id, &owner.subscription_id);
        let workspaces = Arc::new(Workspaces::new(tools.clone(), cache.clone()));
        let versions = Arc::new(KubernetesVersions::new(backends.versions, cache.clone()));
        let current_lab = Arc::new(CurrentLab::new(
            cache.clone(),
            versions.clone(),
            config.scripts_dir().join("template.sh"),
        ));
        let orchestrator = Arc::new(Orchestrator::new(OrchestratorParts {
            owner,
            tools,
            logs: logs.clone(),
            ledger: ledger.clone(),
            workspaces: workspaces.clone(),
            versions: versions.clone(),
            current_lab: current_lab.clone(),
            labs: backends.protected_labs,
            reporter: backends.reporter,
        }));

        Self {
            config: Arc::new(config),
            gate,
            logs,
            cache,
            ledger,
            workspaces,
            versions,
            current_lab,
            orchestrator,
            leases: backends.leases,
        }
    }

    pub fn reaper(&self) -> Reaper {
        Reaper::new(
            self.ledger.clone(),
            self.gate.clone(),
            self.leases.clone(),
            &self.config.reaper,
        )
    }
}
