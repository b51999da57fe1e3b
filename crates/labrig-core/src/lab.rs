//! Lab definitions: the infrastructure template plus the optional extend script.
//!
//! JSON on the HTTP surface uses camelCase keys. The provisioning tool sees
//! the same values re-keyed to snake_case (see [`crate::tfvars`]).

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{LabError, Result};
use crate::types::TrackingKind;

/// Placeholder standing in for a protected extend script body.
pub const REDACTED: &str = "redacted";

/// Lab types whose extend scripts are only ever fetched from the protected source.
const PROTECTED_TYPES: &[&str] = &["assignment", "challenge", "readinesslab", "challengelab"];

// ---------------------------------------------------------------------------
// LabDefinition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    #[serde(rename = "type")]
    pub lab_type: String,
    pub template: TfvarConfig,
    /// Base64-encoded shell script, or [`REDACTED`].
    pub extend_script: String,
    pub created_by: String,
    pub created_on: String,
    pub updated_by: String,
    pub updated_on: String,
}

impl LabDefinition {
    pub fn is_redacted(&self) -> bool {
        self.extend_script == REDACTED
    }

    pub fn is_protected(&self) -> bool {
        PROTECTED_TYPES.contains(&self.lab_type.as_str())
    }

    /// Bookkeeping collection for this lab, if its progress is tracked externally.
    pub fn tracking(&self) -> Option<TrackingKind> {
        match self.lab_type.as_str() {
            "assignment" | "readinesslab" => Some(TrackingKind::Assignment),
            "challenge" | "challengelab" => Some(TrackingKind::Challenge),
            _ => None,
        }
    }

    /// Copy safe to cache or hand back to callers.
    pub fn redacted(&self) -> Self {
        let mut lab = self.clone();
        if lab.is_protected() && !lab.extend_script.is_empty() {
            lab.extend_script = REDACTED.to_string();
        }
        lab
    }

    /// Decode the extend script into runnable shell text.
    ///
    /// Carriage returns are dropped so scripts authored on Windows still run.
    /// An empty script decodes to an empty string.
    pub fn decoded_script(&self) -> Result<String> {
        if self.is_redacted() {
            return Err(LabError::ScriptUnavailable(format!(
                "extend script for lab '{}' is redacted",
                self.id
            )));
        }
        decode_script(&self.extend_script)
    }
}

pub fn decode_script(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Ok(String::new());
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| LabError::InvalidLab(format!("extend script is not valid base64: {e}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| LabError::InvalidLab(format!("extend script is not UTF-8: {e}")))?;
    Ok(text.replace('\r', ""))
}

pub fn encode_script(text: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(text.as_bytes())
}

/// Name the protected-lab service files a lab type under.
pub fn authoritative_lab_type(lab_type: &str) -> &str {
    match lab_type {
        "assignment" => "readinesslab",
        "challenge" => "challengelab",
        other => other,
    }
}

/// Inverse of [`authoritative_lab_type`].
pub fn public_lab_type(lab_type: &str) -> &str {
    match lab_type {
        "readinesslab" => "assignment",
        "challengelab" => "challenge",
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// Provisioning template. Collections left as `None` are not passed to the
/// tool at all, so the tool's own defaults apply.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TfvarConfig {
    pub resource_group: Option<ResourceGroup>,
    pub virtual_networks: Option<Vec<VirtualNetwork>>,
    pub subnets: Option<Vec<Subnet>>,
    pub network_security_groups: Option<Vec<NetworkSecurityGroup>>,
    pub jumpservers: Option<Vec<Jumpserver>>,
    pub firewalls: Option<Vec<Firewall>>,
    pub kubernetes_clusters: Option<Vec<KubernetesCluster>>,
    pub container_registries: Option<Vec<ContainerRegistry>>,
    pub app_gateways: Option<Vec<AppGateway>>,
}

impl TfvarConfig {
    pub fn clusters_mut(&mut self) -> impl Iterator<Item = &mut KubernetesCluster> {
        self.kubernetes_clusters.iter_mut().flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceGroup {
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VirtualNetwork {
    pub address_space: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Subnet {
    pub name: String,
    pub address_prefixes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkSecurityGroup {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Jumpserver {
    pub admin_username: String,
    pub admin_password: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Firewall {
    pub sku_name: String,
    pub sku_tier: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerRegistry {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppGateway {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubernetesCluster {
    pub kubernetes_version: String,
    pub network_plugin: String,
    pub network_policy: String,
    pub network_plugin_mode: String,
    pub outbound_type: String,
    pub private_cluster_enabled: String,
    pub addons: Addons,
    pub default_node_pool: DefaultNodePool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Addons {
    pub app_gateway: bool,
    pub microsoft_defender: bool,
    pub virtual_node: bool,
    pub http_application_routing: bool,
    pub service_mesh: ServiceMesh,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceMesh {
    pub enabled: bool,
    pub mode: String,
    pub internal_ingress_gateway_enabled: bool,
    pub external_ingress_gateway_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefaultNodePool {
    pub enable_auto_scaling: bool,
    pub min_count: u32,
    pub max_count: u32,
    pub vm_size: String,
}

// ---------------------------------------------------------------------------
// Default lab
// ---------------------------------------------------------------------------

/// Starter lab for a user with no current lab: one small kubenet cluster.
pub fn default_lab(kubernetes_version: &str, extend_script: String) -> LabDefinition {
    let cluster = KubernetesCluster {
        kubernetes_version: kubernetes_version.to_string(),
        network_plugin: "kubenet".into(),
        network_policy: "null".into(),
        network_plugin_mode: "null".into(),
        outbound_type: "loadBalancer".into(),
        private_cluster_enabled: "false".into(),
        addons: Addons {
            service_mesh: ServiceMesh {
                mode: "Istio".into(),
                ..ServiceMesh::default()
            },
            ..Addons::default()
        },
        default_node_pool: DefaultNodePool {
            enable_auto_scaling: false,
            min_count: 1,
            max_count: 1,
            vm_size: "Standard_D2_v5".into(),
        },
    };

    LabDefinition {
        lab_type: "privatelab".into(),
        template: TfvarConfig {
            resource_group: Some(ResourceGroup {
                location: "East US".into(),
            }),
            virtual_networks: Some(vec![]),
            subnets: Some(vec![]),
            network_security_groups: Some(vec![]),
            jumpservers: Some(vec![]),
            firewalls: Some(vec![]),
            kubernetes_clusters: Some(vec![cluster]),
            container_registries: Some(vec![]),
            app_gateways: Some(vec![]),
        },
        extend_script,
        ..LabDefinition::default()
    }
}
