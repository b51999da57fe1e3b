//! Template → provisioning-tool variable mapping.
//!
//! Every template field is listed in [`TfvarField::ALL`] with the exact
//! variable it becomes. Values are JSON with snake_case keys. Fields with no
//! value are left out so the tool falls back to its own defaults.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::lab::TfvarConfig;

pub const TF_VAR_PREFIX: &str = "TF_VAR_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TfvarField {
    ResourceGroup,
    VirtualNetworks,
    Subnets,
    NetworkSecurityGroups,
    Jumpservers,
    Firewalls,
    KubernetesClusters,
    ContainerRegistries,
    AppGateways,
}

impl TfvarField {
    pub const ALL: &'static [TfvarField] = &[
        TfvarField::ResourceGroup,
        TfvarField::VirtualNetworks,
        TfvarField::Subnets,
        TfvarField::NetworkSecurityGroups,
        TfvarField::Jumpservers,
        TfvarField::Firewalls,
        TfvarField::KubernetesClusters,
        TfvarField::ContainerRegistries,
        TfvarField::AppGateways,
    ];

    pub fn variable_name(self) -> &'static str {
        match self {
            TfvarField::ResourceGroup => "resource_group",
            TfvarField::VirtualNetworks => "virtual_networks",
            TfvarField::Subnets => "subnets",
            TfvarField::NetworkSecurityGroups => "network_security_groups",
            TfvarField::Jumpservers => "jumpservers",
            TfvarField::Firewalls => "firewalls",
            TfvarField::KubernetesClusters => "kubernetes_clusters",
            TfvarField::ContainerRegistries => "container_registries",
            TfvarField::AppGateways => "app_gateways",
        }
    }

    pub fn env_name(self) -> String {
        format!("{TF_VAR_PREFIX}{}", self.variable_name())
    }

    fn value(self, config: &TfvarConfig) -> Result<Value> {
        match self {
            TfvarField::ResourceGroup => encode(&config.resource_group),
            TfvarField::VirtualNetworks => encode(&config.virtual_networks),
            TfvarField::Subnets => encode(&config.subnets),
            TfvarField::NetworkSecurityGroups => encode(&config.network_security_groups),
            TfvarField::Jumpservers => encode(&config.jumpservers),
            TfvarField::Firewalls => encode(&config.firewalls),
            TfvarField::KubernetesClusters => encode(&config.kubernetes_clusters),
            TfvarField::ContainerRegistries => encode(&config.container_registries),
            TfvarField::AppGateways => encode(&config.app_gateways),
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value> {
    Ok(snake_keys(serde_json::to_value(value)?))
}

/// Build the `TF_VAR_*` environment for a template, in [`TfvarField::ALL`] order.
pub fn tool_variables(config: &TfvarConfig) -> Result<Vec<(String, String)>> {
    let mut vars = Vec::with_capacity(TfvarField::ALL.len());
    for field in TfvarField::ALL {
        let value = field.value(config)?;
        if value.is_null() {
            continue;
        }
        vars.push((field.env_name(), serde_json::to_string(&value)?));
    }
    Ok(vars)
}

/// Recursively re-key objects from camelCase to snake_case.
fn snake_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (camel_to_snake(&k), snake_keys(v)))
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(snake_keys).collect()),
        other => other,
    }
}

pub fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
