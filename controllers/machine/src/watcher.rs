//! TinkerbellMachine watcher.
//!
//! Drives reconciliation through `kube_runtime::Controller`, which handles
//! reconnection and serializes passes per machine. Failed passes are
//! requeued with a per-machine Fibonacci backoff that resets on success;
//! lost ownership races are requeued at the minimum delay since the next
//! pass will simply pick other hardware.

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use crate::reconciler::{Reconciler, machine_key};
use crds::TinkerbellMachine;
use futures::StreamExt;
use kube::Api;
use kube_runtime::controller::{Action, Config as RuntimeConfig};
use kube_runtime::{Controller, watcher};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Shared state handed to every reconciliation
pub struct Context {
    reconciler: Arc<Reconciler>,
    backoff_min: Duration,
    backoff_max: Duration,
    /// Backoff per machine (namespace/name -> backoff)
    backoff_states: Mutex<HashMap<String, FibonacciBackoff>>,
}

impl Context {
    pub fn new(reconciler: Arc<Reconciler>, backoff_min: Duration, backoff_max: Duration) -> Self {
        Self {
            reconciler,
            backoff_min,
            backoff_max,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    fn states(&self) -> MutexGuard<'_, HashMap<String, FibonacciBackoff>> {
        self.backoff_states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delay before the next pass for a machine whose pass just failed
    pub fn retry_delay(&self, key: &str, error: &ControllerError) -> Duration {
        if error.is_conflict() {
            return self.backoff_min;
        }

        self.states()
            .entry(key.to_string())
            .or_insert_with(|| FibonacciBackoff::new(self.backoff_min, self.backoff_max))
            .next_backoff()
    }

    /// Forgets the backoff of a machine after a successful pass
    pub fn reset(&self, key: &str) {
        self.states().remove(key);
    }
}

async fn reconcile(machine: Arc<TinkerbellMachine>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    ctx.reconciler.reconcile_machine(&machine).await?;
    ctx.reset(&machine_key(&machine));
    Ok(Action::await_change())
}

fn error_policy(machine: Arc<TinkerbellMachine>, error: &ControllerError, ctx: Arc<Context>) -> Action {
    let key = machine_key(&machine);
    let delay = ctx.retry_delay(&key, error);

    if error.is_conflict() {
        warn!("TinkerbellMachine {} hit a conflict, retrying in {:?}: {}", key, delay, error);
    } else {
        error!("Reconciliation of TinkerbellMachine {} failed, retrying in {:?}: {}", key, delay, error);
    }

    Action::requeue(delay)
}

/// Watches TinkerbellMachine resources.
pub struct Watcher {
    api: Api<TinkerbellMachine>,
    context: Arc<Context>,
}

impl Watcher {
    pub fn new(api: Api<TinkerbellMachine>, context: Context) -> Self {
        Self {
            api,
            context: Arc::new(context),
        }
    }

    /// Runs until the watch stream ends
    pub async fn watch_machines(&self) -> Result<(), ControllerError> {
        info!("Starting TinkerbellMachine watcher");

        // Debounce batches the status writes a pass makes into one follow-up event
        let config = RuntimeConfig::default().debounce(Duration::from_secs(1)).concurrency(4);

        Controller::new(self.api.clone(), watcher::Config::default())
            .with_config(config)
            .run(reconcile, error_policy, self.context.clone())
            .for_each(|res| async move {
                match res {
                    Ok((object, _)) => debug!("Reconciled TinkerbellMachine {}", object.name),
                    Err(e) => debug!("TinkerbellMachine controller event error: {}", e),
                }
            })
            .await;

        Err(ControllerError::Watch("TinkerbellMachine watch stream ended".to_string()))
    }
}
