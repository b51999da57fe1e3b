use std::future::Future;
use std::sync::{Arc, Mutex};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use labrig_core::gate::{ActionGate, GateGuard};
use labrig_core::LabError;

use crate::error::AppError;
use crate::state::AppState;

/// The action gate claimed for one request, handed to the handler through
/// request extensions.
///
/// If the handler never takes the guard (for example the body fails to
/// parse), dropping the request releases the gate.
#[derive(Clone)]
pub struct GateClaim(Arc<Mutex<Option<GateGuard>>>);

impl GateClaim {
    fn new(guard: GateGuard) -> Self {
        Self(Arc::new(Mutex::new(Some(guard))))
    }

    fn take(&self) -> Option<GateGuard> {
        match self.0.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

/// Claim the action gate or answer 409 without touching anything.
pub async fn claim_gate(State(app): State<AppState>, mut req: Request, next: Next) -> Response {
    let guard = match hold_gate(&app.gate).await {
        Ok(guard) => guard,
        Err(e) => {
            tracing::info!(path = %req.uri().path(), "action gate not claimed, rejecting");
            return e.into_response();
        }
    };
    req.extensions_mut().insert(GateClaim::new(guard));
    next.run(req).await
}

/// Claim the action gate for a short mutation of shared state.
///
/// The caller keeps the guard alive until the mutation is done; a busy gate
/// is [`LabError::Busy`].
pub async fn hold_gate(gate: &ActionGate) -> Result<GateGuard, AppError> {
    let gate = gate.clone();
    let guard = tokio::task::spawn_blocking(move || gate.try_claim())
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))?;
    guard.ok_or_else(|| AppError(LabError::Busy.into()))
}

/// Run `work` on its own task that owns the gate claim.
///
/// The gate is released when `work` finishes, whether or not the client is
/// still waiting for the answer.
pub async fn run_gated<F, T>(claim: GateClaim, work: F) -> Result<T, AppError>
where
    F: Future<Output = labrig_core::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let guard = claim
        .take()
        .ok_or_else(|| AppError(anyhow::anyhow!("action gate claim already consumed")))?;
    let handle = tokio::spawn(async move {
        let _guard = guard;
        work.await
    });
    let outcome = handle
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))?;
    Ok(outcome?)
}
