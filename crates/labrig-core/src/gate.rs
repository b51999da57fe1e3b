//! Single-flight gate over state-mutating provisioning operations.
//!
//! The gate is a shared [`ActionStatus`] record with an atomic claim. Reads
//! that fail are treated as "idle": an unreachable store must not lock every
//! future request out, so availability wins over strict exclusion there.
//! There is no lease; a holder that dies without releasing leaves the gate
//! busy until an operator force-releases it.

use std::path::Path;
use std::sync::{Arc, Mutex};

use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::error::{LabError, Result};
use crate::types::ActionStatus;

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

pub trait ActionStatusStore: Send + Sync {
    fn load(&self) -> Result<ActionStatus>;
    fn store(&self, status: &ActionStatus) -> Result<()>;
    /// Write `next` iff the current status is idle. Must be atomic.
    fn claim(&self, next: &ActionStatus) -> Result<bool>;
    /// Write idle iff the stored claim carries `operation_id`. Must be atomic.
    fn release_claim(&self, operation_id: Uuid) -> Result<bool>;
}

#[derive(Default)]
pub struct MemoryActionStore {
    status: Mutex<ActionStatus>,
}

impl MemoryActionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ActionStatus>> {
        self.status
            .lock()
            .map_err(|_| LabError::ActionStore("status lock poisoned".into()))
    }
}

impl ActionStatusStore for MemoryActionStore {
    fn load(&self) -> Result<ActionStatus> {
        Ok(self.lock()?.clone())
    }

    fn store(&self, status: &ActionStatus) -> Result<()> {
        *self.lock()? = status.clone();
        Ok(())
    }

    fn claim(&self, next: &ActionStatus) -> Result<bool> {
        let mut current = self.lock()?;
        if current.in_progress {
            return Ok(false);
        }
        *current = next.clone();
        Ok(true)
    }

    fn release_claim(&self, operation_id: Uuid) -> Result<bool> {
        let mut current = self.lock()?;
        if current.operation_id != Some(operation_id) {
            return Ok(false);
        }
        *current = ActionStatus::idle();
        Ok(true)
    }
}

/// Single-row table; the value is the JSON-encoded status.
const ACTION_STATUS: TableDefinition<&str, &[u8]> = TableDefinition::new("action_status");
const STATUS_ROW: &str = "status";

fn store_err(e: impl std::fmt::Display) -> LabError {
    LabError::ActionStore(e.to_string())
}

/// Gate status persisted in a redb file, so a restart sees the last claim.
pub struct RedbActionStore {
    db: Database,
}

impl RedbActionStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(store_err)?;
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(ACTION_STATUS).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }

    fn decode(raw: Option<Vec<u8>>) -> Result<ActionStatus> {
        match raw {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(store_err),
            None => Ok(ActionStatus::idle()),
        }
    }
}

impl ActionStatusStore for RedbActionStore {
    fn load(&self) -> Result<ActionStatus> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(ACTION_STATUS).map_err(store_err)?;
        let raw = table
            .get(STATUS_ROW)
            .map_err(store_err)?
            .map(|guard| guard.value().to_vec());
        Self::decode(raw)
    }

    fn store(&self, status: &ActionStatus) -> Result<()> {
        let value = serde_json::to_vec(status)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(ACTION_STATUS).map_err(store_err)?;
            table
                .insert(STATUS_ROW, value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }

    fn claim(&self, next: &ActionStatus) -> Result<bool> {
        // redb serializes write transactions, so read-check-write here is atomic.
        let value = serde_json::to_vec(next)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(ACTION_STATUS).map_err(store_err)?;
            let raw = table
                .get(STATUS_ROW)
                .map_err(store_err)?
                .map(|guard| guard.value().to_vec());
            if Self::decode(raw)?.in_progress {
                return Ok(false);
            }
            table
                .insert(STATUS_ROW, value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(true)
    }

    fn release_claim(&self, operation_id: Uuid) -> Result<bool> {
        let value = serde_json::to_vec(&ActionStatus::idle())?;
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(ACTION_STATUS).map_err(store_err)?;
            let raw = table
                .get(STATUS_ROW)
                .map_err(store_err)?
                .map(|guard| guard.value().to_vec());
            if Self::decode(raw)?.operation_id != Some(operation_id) {
                return Ok(false);
            }
            table
                .insert(STATUS_ROW, value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// ActionGate
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ActionGate {
    store: Arc<dyn ActionStatusStore>,
}

impl ActionGate {
    pub fn new(store: Arc<dyn ActionStatusStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryActionStore::new()))
    }

    /// Current status. An unreadable store reports idle.
    pub fn status(&self) -> ActionStatus {
        match self.store.load() {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(error = %e, "action status unreadable, reporting idle");
                ActionStatus::idle()
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.status().in_progress
    }

    /// Mark busy iff idle. Returns whether this caller now holds the gate.
    pub fn try_acquire(&self) -> bool {
        self.acquire().is_some()
    }

    /// Claim the gate, returning the operation id written with the claim.
    fn acquire(&self) -> Option<Uuid> {
        let next = ActionStatus::started_now();
        let operation_id = next.operation_id?;
        let claimed = match self.store.claim(&next) {
            Ok(claimed) => {
                if claimed {
                    tracing::info!(%operation_id, "action gate claimed");
                }
                claimed
            }
            Err(e) => {
                tracing::error!(error = %e, "action status unreadable, resetting to idle");
                if let Err(e) = self.store.store(&ActionStatus::idle()) {
                    tracing::error!(error = %e, "could not reset action status");
                }
                match self.store.claim(&next) {
                    Ok(claimed) => claimed,
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            "action store unavailable, proceeding without a recorded claim"
                        );
                        true
                    }
                }
            }
        };
        claimed.then_some(operation_id)
    }

    /// Force the gate idle regardless of who holds it.
    pub fn release(&self) {
        match self.store.store(&ActionStatus::idle()) {
            Ok(()) => tracing::info!("action gate released"),
            Err(e) => tracing::error!(error = %e, "failed to release action gate"),
        }
    }

    /// Release the claim made under `operation_id`. A claim that was
    /// force-released and re-taken by another operation is left alone.
    pub fn release_claim(&self, operation_id: Uuid) {
        match self.store.release_claim(operation_id) {
            Ok(true) => tracing::info!(%operation_id, "action gate released"),
            Ok(false) => tracing::warn!(
                %operation_id,
                "action gate no longer held by this operation, leaving it as is"
            ),
            Err(e) => tracing::error!(error = %e, %operation_id, "failed to release action gate"),
        }
    }

    /// RAII form of [`try_acquire`](Self::try_acquire): the claim is released
    /// exactly once, when the returned guard drops.
    pub fn try_claim(&self) -> Option<GateGuard> {
        self.acquire().map(|operation_id| GateGuard {
            gate: self.clone(),
            operation_id,
        })
    }
}

pub struct GateGuard {
    gate: ActionGate,
    operation_id: Uuid,
}

impl GateGuard {
    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.gate.release_claim(self.operation_id);
    }
}
