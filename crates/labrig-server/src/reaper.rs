//! Background eviction of abandoned deployment records.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use labrig_core::config::ReaperConfig;
use labrig_core::gate::ActionGate;
use labrig_core::types::{Deployment, DeploymentKey, DeploymentStatus};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::ledger::DeploymentLedger;
use crate::storage::LeaseBreaker;

#[derive(Debug, Default, PartialEq)]
pub struct ReapReport {
    pub evicted: Vec<DeploymentKey>,
    pub failed: Vec<DeploymentKey>,
}

pub struct Reaper {
    ledger: Arc<DeploymentLedger>,
    gate: ActionGate,
    leases: Arc<dyn LeaseBreaker>,
    stale_after: Duration,
    requested_stale_after: Duration,
    interval: std::time::Duration,
}

fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

impl Reaper {
    pub fn new(
        ledger: Arc<DeploymentLedger>,
        gate: ActionGate,
        leases: Arc<dyn LeaseBreaker>,
        policy: &ReaperConfig,
    ) -> Self {
        Self {
            ledger,
            gate,
            leases,
            stale_after: seconds(policy.stale_after_secs),
            requested_stale_after: seconds(policy.requested_stale_after_secs),
            interval: policy.interval(),
        }
    }

    /// Whether `deployment` should be evicted at `now`. Records of a running
    /// workflow are left alone while the gate is held.
    pub fn is_abandoned(&self, deployment: &Deployment, now: DateTime<Utc>, gate_busy: bool) -> bool {
        let age = now - deployment.last_updated;
        match deployment.status {
            DeploymentStatus::Requested => age > self.requested_stale_after,
            DeploymentStatus::InProgress | DeploymentStatus::Destroying => {
                !gate_busy && age > self.stale_after
            }
            DeploymentStatus::Applied | DeploymentStatus::Failed | DeploymentStatus::Destroyed => {
                false
            }
        }
    }

    /// One scan over every tracked (user, subscription) pair.
    pub async fn pass(&self, now: DateTime<Utc>) -> ReapReport {
        let gate_busy = self.gate.is_busy();
        let mut report = ReapReport::default();

        for (user_id, subscription_id) in self.ledger.tracked() {
            let records = match self.ledger.list(&user_id, &subscription_id).await {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(
                        user_id = %user_id,
                        subscription_id = %subscription_id,
                        error = %e,
                        "reaper could not list deployments"
                    );
                    continue;
                }
            };

            for deployment in records {
                if !self.is_abandoned(&deployment, now, gate_busy) {
                    continue;
                }
                let key = deployment.key();
                if let Err(e) = self.ledger.delete(&key).await {
                    tracing::warn!(key = %key, error = %e, "reaper could not evict deployment");
                    report.failed.push(key);
                    continue;
                }
                tracing::info!(
                    key = %key,
                    status = %deployment.status,
                    last_updated = %deployment.last_updated,
                    "evicted abandoned deployment"
                );
                if deployment.status.is_active() {
                    if let Err(e) = self.leases.break_lease(&key.workspace).await {
                        tracing::warn!(key = %key, error = %e, "state lease cleanup failed");
                    }
                }
                report.evicted.push(key);
            }
        }
        report
    }

    /// Run [`pass`](Self::pass) on the configured interval until the runtime stops.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; the first scan waits one period.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = self.pass(Utc::now()).await;
                if !report.evicted.is_empty() || !report.failed.is_empty() {
                    tracing::info!(
                        evicted = report.evicted.len(),
                        failed = report.failed.len(),
                        "reaper pass complete"
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::DeploymentStore;
    use crate::ledger::MemoryDeploymentStore;
    use async_trait::async_trait;
    use labrig_core::cache::MemoryCache;
    use labrig_core::{LabError, Result};
    use std::sync::Mutex;

    /// Memory store that refuses to delete one workspace.
    struct StubbornStore {
        inner: MemoryDeploymentStore,
        stuck_workspace: &'static str,
    }

    #[async_trait]
    impl DeploymentStore for StubbornStore {
        async fn list(&self, user_id: &str) -> Result<Vec<Deployment>> {
            self.inner.list(user_id).await
        }
        async fn upsert(&self, deployment: &Deployment) -> Result<()> {
            self.inner.upsert(deployment).await
        }
        async fn delete(&self, key: &DeploymentKey) -> Result<()> {
            if key.workspace == self.stuck_workspace {
                return Err(LabError::Upstream("delete refused".into()));
            }
            self.inner.delete(key).await
        }
    }

    #[derive(Default)]
    struct RecordingLeases {
        broken: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LeaseBreaker for RecordingLeases {
        async fn break_lease(&self, workspace: &str) -> Result<()> {
            self.broken.lock().unwrap().push(workspace.to_string());
            Ok(())
        }
    }

    fn aged(workspace: &str, status: DeploymentStatus, age_secs: i64) -> Deployment {
        let mut d = Deployment::new(&DeploymentKey::new("owner", "sub", workspace), status);
        d.last_updated = Utc::now() - Duration::seconds(age_secs);
        d
    }

    fn policy() -> ReaperConfig {
        ReaperConfig {
            interval_secs: 60,
            stale_after_secs: 3600,
            requested_stale_after_secs: 600,
        }
    }

    fn reaper_over(
        store: Arc<dyn DeploymentStore>,
        gate: ActionGate,
    ) -> (Reaper, Arc<DeploymentLedger>, Arc<RecordingLeases>) {
        let ledger = Arc::new(DeploymentLedger::new(store, Arc::new(MemoryCache::new())));
        ledger.track("owner", "sub");
        let leases = Arc::new(RecordingLeases::default());
        let reaper = Reaper::new(ledger.clone(), gate, leases.clone(), &policy());
        (reaper, ledger, leases)
    }

    #[tokio::test]
    async fn evicts_stale_and_keeps_fresh() {
        let store = Arc::new(MemoryDeploymentStore::new());
        store.seed(aged("stuck", DeploymentStatus::InProgress, 7200));
        store.seed(aged("running", DeploymentStatus::InProgress, 60));
        store.seed(aged("orphan", DeploymentStatus::Requested, 1200));
        store.seed(aged("fresh-request", DeploymentStatus::Requested, 30));
        store.seed(aged("done", DeploymentStatus::Applied, 999_999));
        store.seed(aged("broken", DeploymentStatus::Failed, 999_999));

        let (reaper, _, leases) = reaper_over(store.clone(), ActionGate::in_memory());
        let report = reaper.pass(Utc::now()).await;

        let mut evicted: Vec<_> = report.evicted.iter().map(|k| k.workspace.as_str()).collect();
        evicted.sort();
        assert_eq!(evicted, vec!["orphan", "stuck"]);
        assert!(report.failed.is_empty());

        let mut left: Vec<_> = store.snapshot().into_iter().map(|d| d.workspace).collect();
        left.sort();
        assert_eq!(left, vec!["broken", "done", "fresh-request", "running"]);
        assert_eq!(*leases.broken.lock().unwrap(), vec!["stuck".to_string()]);
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_pass() {
        let store = Arc::new(StubbornStore {
            inner: MemoryDeploymentStore::new(),
            stuck_workspace: "a",
        });
        store.inner.seed(aged("a", DeploymentStatus::Destroying, 9000));
        store.inner.seed(aged("b", DeploymentStatus::Destroying, 9000));
        store.inner.seed(aged("c", DeploymentStatus::Requested, 9000));

        let (reaper, _, _) = reaper_over(store.clone(), ActionGate::in_memory());
        let report = reaper.pass(Utc::now()).await;

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].workspace, "a");
        assert_eq!(report.evicted.len(), 2);
        let left: Vec<_> = store.inner.snapshot().into_iter().map(|d| d.workspace).collect();
        assert_eq!(left, vec!["a"]);
    }

    #[tokio::test]
    async fn busy_gate_protects_active_records_only() {
        let store = Arc::new(MemoryDeploymentStore::new());
        store.seed(aged("active", DeploymentStatus::InProgress, 9000));
        store.seed(aged("orphan", DeploymentStatus::Requested, 9000));

        let gate = ActionGate::in_memory();
        let _held = gate.try_claim().unwrap();
        let (reaper, _, _) = reaper_over(store.clone(), gate);
        let report = reaper.pass(Utc::now()).await;

        assert_eq!(report.evicted.len(), 1);
        assert_eq!(report.evicted[0].workspace, "orphan");
        assert_eq!(store.snapshot()[0].workspace, "active");
    }

    #[tokio::test]
    async fn evicted_record_disappears_from_ledger_reads() {
        let store = Arc::new(MemoryDeploymentStore::new());
        store.seed(aged("stuck", DeploymentStatus::InProgress, 9000));
        let (reaper, ledger, _) = reaper_over(store, ActionGate::in_memory());

        assert_eq!(ledger.list("owner", "sub").await.unwrap().len(), 1);
        reaper.pass(Utc::now()).await;
        assert!(ledger.list("owner", "sub").await.unwrap().is_empty());
    }
}
