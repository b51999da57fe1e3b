//! Supported Kubernetes versions and the cached default.

use std::sync::Arc;

use async_trait::async_trait;
use labrig_core::cache::{self, Cache};
use labrig_core::config::KubernetesConfig;
use labrig_core::kversion::{self, VersionSubstitution};
use labrig_core::lab::LabDefinition;
use labrig_core::{LabError, Result};

#[async_trait]
pub trait VersionCatalog: Send + Sync {
    async fn supported_versions(&self) -> Result<Vec<String>>;
    /// Default to prefer when it is still supported.
    fn preferred_default(&self) -> Option<String>;
}

/// Versions pinned in the server configuration.
pub struct ConfiguredVersions {
    config: KubernetesConfig,
}

impl ConfiguredVersions {
    pub fn new(config: KubernetesConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl VersionCatalog for ConfiguredVersions {
    async fn supported_versions(&self) -> Result<Vec<String>> {
        Ok(self.config.supported_versions.clone())
    }

    fn preferred_default(&self) -> Option<String> {
        self.config.default_version.clone()
    }
}

pub struct KubernetesVersions {
    catalog: Arc<dyn VersionCatalog>,
    cache: Arc<dyn Cache>,
}

impl KubernetesVersions {
    pub fn new(catalog: Arc<dyn VersionCatalog>, cache: Arc<dyn Cache>) -> Self {
        Self { catalog, cache }
    }

    pub async fn supported(&self) -> Result<Vec<String>> {
        match cache::get_json::<Vec<String>>(self.cache.as_ref(), cache::KUBERNETES_VERSIONS_KEY) {
            Ok(Some(hit)) if !hit.is_empty() => return Ok(hit),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "kubernetes versions cache read failed"),
        }
        let versions = self.catalog.supported_versions().await?;
        if let Err(e) = cache::set_json(
            self.cache.as_ref(),
            cache::KUBERNETES_VERSIONS_KEY,
            &versions,
        ) {
            tracing::warn!(error = %e, "kubernetes versions cache write failed");
        }
        Ok(versions)
    }

    /// Current default. A cached default that fell out of the supported set
    /// is dropped and recomputed.
    pub async fn default_version(&self) -> Result<String> {
        let supported = self.supported().await?;
        self.default_within(&supported)
    }

    fn default_within(&self, supported: &[String]) -> Result<String> {
        let key = cache::KUBERNETES_DEFAULT_KEY;
        match cache::get_json::<String>(self.cache.as_ref(), key) {
            Ok(Some(cached)) if supported.contains(&cached) => return Ok(cached),
            Ok(Some(stale)) => {
                tracing::info!(version = %stale, "cached kubernetes default no longer supported");
                if let Err(e) = self.cache.delete(key) {
                    tracing::warn!(error = %e, "could not drop stale kubernetes default");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "kubernetes default cache read failed"),
        }

        let chosen = self
            .catalog
            .preferred_default()
            .filter(|v| supported.contains(v))
            .or_else(|| kversion::newest(supported))
            .ok_or_else(|| LabError::Config("no supported Kubernetes versions available".into()))?;
        if let Err(e) = cache::set_json(self.cache.as_ref(), key, &chosen) {
            tracing::warn!(error = %e, "kubernetes default cache write failed");
        }
        Ok(chosen)
    }

    /// Move every unsupported cluster version in `lab` to the default.
    pub async fn reconcile(&self, lab: &mut LabDefinition) -> Result<Vec<VersionSubstitution>> {
        if lab.template.clusters_mut().next().is_none() {
            return Ok(Vec::new());
        }
        let supported = self.supported().await?;
        let default = self.default_within(&supported)?;
        let changes = kversion::reconcile_clusters(&mut lab.template, &supported, &default);
        for change in &changes {
            tracing::warn!(
                lab_id = %lab.id,
                cluster = change.cluster_index,
                from = %change.from,
                to = %change.to,
                "unsupported kubernetes version replaced with default"
            );
        }
        Ok(changes)
    }
}
