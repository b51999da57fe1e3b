//! The instance owner's current (working copy) lab.

use std::path::PathBuf;
use std::sync::Arc;

use labrig_core::cache::{self, Cache};
use labrig_core::lab::{default_lab, encode_script, LabDefinition};
use labrig_core::Result;

use crate::kubernetes::KubernetesVersions;

pub struct CurrentLab {
    cache: Arc<dyn Cache>,
    versions: Arc<KubernetesVersions>,
    template_script: PathBuf,
}

impl CurrentLab {
    pub fn new(
        cache: Arc<dyn Cache>,
        versions: Arc<KubernetesVersions>,
        template_script: PathBuf,
    ) -> Self {
        Self {
            cache,
            versions,
            template_script,
        }
    }

    /// Stored lab, or a freshly generated default that is stored on the way out.
    pub async fn get(&self) -> Result<LabDefinition> {
        match cache::get_json::<LabDefinition>(self.cache.as_ref(), cache::LAB_KEY) {
            Ok(Some(lab)) => return Ok(lab),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "current lab cache read failed"),
        }

        let script = match tokio::fs::read_to_string(&self.template_script).await {
            Ok(text) => encode_script(&text),
            Err(e) => {
                tracing::debug!(
                    path = %self.template_script.display(),
                    error = %e,
                    "no template extend script, default lab gets none"
                );
                String::new()
            }
        };
        let version = self.versions.default_version().await?;
        let lab = default_lab(&version, script);
        if let Err(e) = cache::set_json(self.cache.as_ref(), cache::LAB_KEY, &lab) {
            tracing::warn!(error = %e, "current lab cache write failed");
        }
        Ok(lab)
    }

    /// Store `lab` redacted, giving clusters without a version the current default.
    pub async fn put(&self, lab: LabDefinition) -> Result<LabDefinition> {
        let mut lab = lab.redacted();
        if lab
            .template
            .clusters_mut()
            .any(|c| c.kubernetes_version.is_empty())
        {
            let version = self.versions.default_version().await?;
            for cluster in lab.template.clusters_mut() {
                if cluster.kubernetes_version.is_empty() {
                    cluster.kubernetes_version = version.clone();
                }
            }
        }
        cache::set_json(self.cache.as_ref(), cache::LAB_KEY, &lab)?;
        Ok(lab)
    }

    pub fn delete(&self) -> Result<()> {
        self.cache.delete(cache::LAB_KEY)
    }
}
