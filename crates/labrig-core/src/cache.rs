//! Read-mostly reference data cache.
//!
//! Entries are JSON strings under flat keys. Nothing expires on its own;
//! writers delete the entries their mutation makes stale.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{LabError, Result};
use crate::types::DeploymentKey;

pub const LAB_KEY: &str = "lab";
pub const WORKSPACES_KEY: &str = "terraform-workspaces";
pub const RESOURCES_KEY: &str = "terraform-resources";
pub const KUBERNETES_VERSIONS_KEY: &str = "kubernetes-versions";
pub const KUBERNETES_DEFAULT_KEY: &str = "kubernetes-default-version";
pub const STORAGE_ACCOUNT_KEY: &str = "storage-account-name";

pub fn deployment_key(key: &DeploymentKey) -> String {
    format!("{}-{}-{}", key.user_id, key.subscription_id, key.workspace)
}

pub fn deployment_list_key(user_id: &str) -> String {
    format!("{user_id}-deployments")
}

pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: String) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Typed read. A value that no longer parses counts as a miss.
pub fn get_json<T: DeserializeOwned>(cache: &dyn Cache, key: &str) -> Result<Option<T>> {
    match cache.get(key)? {
        Some(raw) => match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::debug!(key, error = %e, "discarding unreadable cache entry");
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

pub fn set_json<T: Serialize>(cache: &dyn Cache, key: &str, value: &T) -> Result<()> {
    cache.set(key, serde_json::to_string(value)?)
}

// ---------------------------------------------------------------------------
// MemoryCache
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| LabError::Cache("cache lock poisoned".into()))
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete() {
        let cache = MemoryCache::new();
        cache.set("a", "1".into()).unwrap();
        assert_eq!(cache.get("a").unwrap().as_deref(), Some("1"));
        cache.delete("a").unwrap();
        assert_eq!(cache.get("a").unwrap(), None);
    }

    #[test]
    fn clear_drops_everything() {
        let cache = MemoryCache::new();
        cache.set("a", "1".into()).unwrap();
        cache.set("b", "2".into()).unwrap();
        cache.clear().unwrap();
        assert_eq!(cache.get("a").unwrap(), None);
        assert_eq!(cache.get("b").unwrap(), None);
    }

    #[test]
    fn unreadable_json_is_a_miss() {
        let cache = MemoryCache::new();
        cache.set("versions", "{not json".into()).unwrap();
        let got: Option<Vec<String>> = get_json(&cache, "versions").unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn deployment_keys() {
        let key = DeploymentKey::new("alice", "sub", "dev");
        assert_eq!(deployment_key(&key), "alice-sub-dev");
        assert_eq!(deployment_list_key("alice"), "alice-deployments");
    }
}
