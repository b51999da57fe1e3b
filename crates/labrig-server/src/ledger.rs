//! Deployment records: cache in front of the authoritative store.
//!
//! Writes go to the store first, then drop the single-record entry and the
//! owner's list entry. Lists are never patched in place.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use labrig_core::cache::{self, Cache};
use labrig_core::types::{Deployment, DeploymentKey};
use labrig_core::{LabError, Result};

use crate::hub::DeploymentStore;

pub struct DeploymentLedger {
    store: Arc<dyn DeploymentStore>,
    cache: Arc<dyn Cache>,
    /// (user, subscription) pairs seen since start; the reaper scans these.
    tracked: Mutex<BTreeSet<(String, String)>>,
}

impl DeploymentLedger {
    pub fn new(store: Arc<dyn DeploymentStore>, cache: Arc<dyn Cache>) -> Self {
        Self {
            store,
            cache,
            tracked: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn track(&self, user_id: &str, subscription_id: &str) {
        if let Ok(mut tracked) = self.tracked.lock() {
            tracked.insert((user_id.to_string(), subscription_id.to_string()));
        }
    }

    pub fn tracked(&self) -> Vec<(String, String)> {
        match self.tracked.lock() {
            Ok(tracked) => tracked.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    pub async fn get(&self, key: &DeploymentKey) -> Result<Deployment> {
        let cache_key = cache::deployment_key(key);
        match cache::get_json::<Deployment>(self.cache.as_ref(), &cache_key) {
            Ok(Some(hit)) => return Ok(hit),
            Ok(None) => {}
            Err(e) => tracing::warn!(key = %key, error = %e, "deployment cache read failed"),
        }

        let found = self
            .list(&key.user_id, &key.subscription_id)
            .await?
            .into_iter()
            .find(|d| d.workspace == key.workspace)
            .ok_or_else(|| LabError::DeploymentNotFound {
                user_id: key.user_id.clone(),
                subscription_id: key.subscription_id.clone(),
                workspace: key.workspace.clone(),
            })?;

        if let Err(e) = cache::set_json(self.cache.as_ref(), &cache_key, &found) {
            tracing::warn!(key = %key, error = %e, "deployment cache write failed");
        }
        Ok(found)
    }

    pub async fn list(&self, user_id: &str, subscription_id: &str) -> Result<Vec<Deployment>> {
        self.track(user_id, subscription_id);
        let list_key = cache::deployment_list_key(user_id);

        let all = match cache::get_json::<Vec<Deployment>>(self.cache.as_ref(), &list_key) {
            Ok(Some(hit)) => hit,
            other => {
                if let Err(e) = other {
                    tracing::warn!(user_id, error = %e, "deployment list cache read failed");
                }
                let fresh = self.store.list(user_id).await?;
                if let Err(e) = cache::set_json(self.cache.as_ref(), &list_key, &fresh) {
                    tracing::warn!(user_id, error = %e, "deployment list cache write failed");
                }
                fresh
            }
        };

        Ok(all
            .into_iter()
            .filter(|d| d.subscription_id == subscription_id)
            .collect())
    }

    pub async fn upsert(&self, deployment: &Deployment) -> Result<()> {
        let key = deployment.key();
        self.track(&key.user_id, &key.subscription_id);
        self.store.upsert(deployment).await?;
        self.invalidate(&key);
        tracing::debug!(key = %key, status = %deployment.status, "deployment upserted");
        Ok(())
    }

    pub async fn delete(&self, key: &DeploymentKey) -> Result<()> {
        self.store.delete(key).await?;
        self.invalidate(key);
        tracing::debug!(key = %key, "deployment deleted");
        Ok(())
    }

    fn invalidate(&self, key: &DeploymentKey) {
        for entry in [
            cache::deployment_key(key),
            cache::deployment_list_key(&key.user_id),
        ] {
            if let Err(e) = self.cache.delete(&entry) {
                tracing::error!(entry = %entry, error = %e, "deployment cache invalidation failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryDeploymentStore
// ---------------------------------------------------------------------------

/// In-process store, used when running without a hub and in tests.
#[derive(Default)]
pub struct MemoryDeploymentStore {
    records: Mutex<BTreeMap<DeploymentKey, Deployment>>,
    list_calls: AtomicUsize,
}

impl MemoryDeploymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `list` calls served, to observe cache effectiveness.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Insert directly, bypassing any ledger cache.
    pub fn seed(&self, deployment: Deployment) {
        if let Ok(mut records) = self.records.lock() {
            records.insert(deployment.key(), deployment);
        }
    }

    pub fn snapshot(&self) -> Vec<Deployment> {
        self.records
            .lock()
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<DeploymentKey, Deployment>>> {
        self.records
            .lock()
            .map_err(|_| LabError::Upstream("deployment store lock poisoned".into()))
    }
}

#[async_trait]
impl DeploymentStore for MemoryDeploymentStore {
    async fn list(&self, user_id: &str) -> Result<Vec<Deployment>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .lock()?
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert(&self, deployment: &Deployment) -> Result<()> {
        self.lock()?.insert(deployment.key(), deployment.clone());
        Ok(())
    }

    async fn delete(&self, key: &DeploymentKey) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labrig_core::cache::MemoryCache;
    use labrig_core::types::DeploymentStatus;

    /// Cache whose every operation fails.
    struct BrokenCache;

    impl Cache for BrokenCache {
        fn get(&self, _: &str) -> Result<Option<String>> {
            Err(LabError::Cache("down".into()))
        }
        fn set(&self, _: &str, _: String) -> Result<()> {
            Err(LabError::Cache("down".into()))
        }
        fn delete(&self, _: &str) -> Result<()> {
            Err(LabError::Cache("down".into()))
        }
        fn clear(&self) -> Result<()> {
            Err(LabError::Cache("down".into()))
        }
    }

    fn ledger() -> (DeploymentLedger, Arc<MemoryDeploymentStore>, Arc<MemoryCache>) {
        let store = Arc::new(MemoryDeploymentStore::new());
        let cache = Arc::new(MemoryCache::new());
        (
            DeploymentLedger::new(store.clone(), cache.clone()),
            store,
            cache,
        )
    }

    #[tokio::test]
    async fn upsert_then_get_returns_value() {
        let (ledger, _, _) = ledger();
        let key = DeploymentKey::new("alice", "sub", "dev");
        let d = Deployment::new(&key, DeploymentStatus::InProgress);
        ledger.upsert(&d).await.unwrap();
        assert_eq!(ledger.get(&key).await.unwrap(), d);

        let mut next = d.clone();
        next.transition(DeploymentStatus::Applied);
        ledger.upsert(&next).await.unwrap();
        assert_eq!(ledger.get(&key).await.unwrap().status, DeploymentStatus::Applied);
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let (ledger, _, _) = ledger();
        let key = DeploymentKey::new("alice", "sub", "dev");
        ledger
            .upsert(&Deployment::new(&key, DeploymentStatus::Applied))
            .await
            .unwrap();
        ledger.get(&key).await.unwrap();
        ledger.delete(&key).await.unwrap();
        let err = ledger.get(&key).await.unwrap_err();
        assert!(matches!(err, LabError::DeploymentNotFound { .. }));
    }

    #[tokio::test]
    async fn list_is_cached_until_a_write() {
        let (ledger, store, _) = ledger();
        let key = DeploymentKey::new("alice", "sub", "dev");
        store.seed(Deployment::new(&key, DeploymentStatus::Applied));

        assert_eq!(ledger.list("alice", "sub").await.unwrap().len(), 1);
        assert_eq!(ledger.list("alice", "sub").await.unwrap().len(), 1);
        assert_eq!(store.list_calls(), 1);

        let other = DeploymentKey::new("alice", "sub", "prod");
        ledger
            .upsert(&Deployment::new(&other, DeploymentStatus::Requested))
            .await
            .unwrap();
        assert_eq!(ledger.list("alice", "sub").await.unwrap().len(), 2);
        assert_eq!(store.list_calls(), 2);
    }

    #[tokio::test]
    async fn writes_do_not_invalidate_other_users() {
        let (ledger, store, _) = ledger();
        store.seed(Deployment::new(
            &DeploymentKey::new("bob", "sub", "dev"),
            DeploymentStatus::Applied,
        ));
        ledger.list("bob", "sub").await.unwrap();
        ledger
            .upsert(&Deployment::new(
                &DeploymentKey::new("alice", "sub", "dev"),
                DeploymentStatus::Requested,
            ))
            .await
            .unwrap();
        ledger.list("bob", "sub").await.unwrap();
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn list_filters_by_subscription() {
        let (ledger, store, _) = ledger();
        store.seed(Deployment::new(
            &DeploymentKey::new("alice", "sub-a", "dev"),
            DeploymentStatus::Applied,
        ));
        store.seed(Deployment::new(
            &DeploymentKey::new("alice", "sub-b", "dev"),
            DeploymentStatus::Applied,
        ));
        let listed = ledger.list("alice", "sub-b").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].subscription_id, "sub-b");
    }

    #[tokio::test]
    async fn broken_cache_falls_back_to_store() {
        let store = Arc::new(MemoryDeploymentStore::new());
        let ledger = DeploymentLedger::new(store.clone(), Arc::new(BrokenCache));
        let key = DeploymentKey::new("alice", "sub", "dev");
        let d = Deployment::new(&key, DeploymentStatus::InProgress);
        ledger.upsert(&d).await.unwrap();
        assert_eq!(ledger.get(&key).await.unwrap(), d);
        ledger.delete(&key).await.unwrap();
        assert!(ledger.get(&key).await.is_err());
    }

    #[tokio::test]
    async fn reads_and_writes_track_pairs() {
        let (ledger, _, _) = ledger();
        ledger.track("owner", "sub");
        ledger.list("bob", "sub-2").await.unwrap();
        assert_eq!(
            ledger.tracked(),
            vec![
                ("bob".to_string(), "sub-2".to_string()),
                ("owner".to_string(), "sub".to_string()),
            ]
        );
    }
}
