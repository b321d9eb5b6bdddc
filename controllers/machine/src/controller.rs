//! Main controller implementation.
//!
//! Wires the Kubernetes client, resource store, reconciler, watcher and
//! probe server together and runs them until one of them stops.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::probes::{self, ProbeState};
use crate::reconciler::{Reconciler, ReconcilerConfig};
use crate::watcher::{Context, Watcher};
use crds::TinkerbellMachine;
use hardware_store::KubeStore;
use kube::api::ListParams;
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for TinkerbellMachine provisioning.
#[derive(Debug)]
pub struct Controller {
    machine_watcher: JoinHandle<Result<(), ControllerError>>,
    probe_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Connects to the cluster and starts the watcher and probe server.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Tinkerbell machine controller");

        let client = Client::try_default().await?;

        let probe_state = ProbeState::default();
        let probe_server = tokio::spawn(probes::serve(config.probe_addr, probe_state.clone()));

        let api: Api<TinkerbellMachine> = match config.namespace.as_deref() {
            Some(ns) => Api::namespaced(client.clone(), ns),
            None => Api::all(client.clone()),
        };

        // Fails fast when the CRD is missing or RBAC denies access
        api.list(&ListParams::default().limit(1)).await?;
        probe_state.set_ready();

        let reconciler = Reconciler::new(
            Arc::new(KubeStore::new(client)),
            ReconcilerConfig {
                metadata_url: config.metadata_url(),
            },
        );

        let watcher = Watcher::new(
            api,
            Context::new(Arc::new(reconciler), config.backoff_min, config.backoff_max),
        );
        let machine_watcher = tokio::spawn(async move { watcher.watch_machines().await });

        Ok(Self {
            machine_watcher,
            probe_server,
        })
    }

    /// Runs until the watcher or the probe server stops.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Tinkerbell machine controller running");

        tokio::select! {
            result = &mut self.machine_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("TinkerbellMachine watcher panicked: {e}")))??;
            }
            result = &mut self.probe_server => {
                result.map_err(|e| ControllerError::Probe(format!("probe server panicked: {e}")))??;
            }
        }

        Ok(())
    }
}
