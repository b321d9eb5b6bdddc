//! Reconciliation logic for TinkerbellMachine resources.
//!
//! A pass is a fixed sequence of idempotent stages:
//! 1. finalizer on the machine
//! 2. hardware: allocate, claim, inject user data, report status
//! 3. template
//! 4. workflow
//! 5. ready
//!
//! Every stage either finds its postcondition already in place or
//! establishes it, so a failed pass is simply run again from the top. The
//! stage implementations live in their own modules as `impl Reconciler`
//! blocks (`allocator`, `ownership`, `user_data`, `status`, `template`,
//! `workflow`, `release`).

use crate::error::{ControllerError, Stage, StageExt};
use crate::user_data::provider_id;
use crds::{Hardware, MACHINE_FINALIZER, TinkerbellMachine};
use hardware_store::ResourceStore;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use std::sync::Arc;
use tracing::{debug, info};

/// Settings the pipeline needs from the process configuration
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Metadata service URL written into generated templates
    pub metadata_url: String,
}

/// Reconciles TinkerbellMachine resources.
pub struct Reconciler {
    pub(crate) store: Arc<dyn ResourceStore>,
    pub(crate) config: ReconcilerConfig,
}

/// Namespace and name of a machine
pub(crate) fn machine_identity(machine: &TinkerbellMachine) -> Result<(&str, &str), ControllerError> {
    let name = machine
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| ControllerError::InvalidConfig("TinkerbellMachine missing name".to_string()))?;
    let namespace = machine.metadata.namespace.as_deref().unwrap_or("default");
    Ok((namespace, name))
}

/// Owner reference pointing at the machine, for objects created on its behalf
pub(crate) fn owner_reference(machine: &TinkerbellMachine) -> Result<OwnerReference, ControllerError> {
    machine.owner_ref(&()).ok_or_else(|| {
        ControllerError::InvalidConfig(format!("TinkerbellMachine {} has no uid", machine_key(machine)))
    })
}

impl Reconciler {
    pub fn new(store: Arc<dyn ResourceStore>, config: ReconcilerConfig) -> Self {
        Self { store, config }
    }

    /// Runs one reconciliation pass for a machine.
    ///
    /// Machines being deleted release their hardware instead. Errors carry
    /// the failed stage; nothing is retried here.
    pub async fn reconcile_machine(&self, machine: &TinkerbellMachine) -> Result<(), ControllerError> {
        let (namespace, name) = machine_identity(machine)?;

        if machine.metadata.deletion_timestamp.is_some() {
            info!("TinkerbellMachine {}/{} is being deleted", namespace, name);
            return self.release_machine(machine).await.stage(Stage::Release);
        }

        info!("Reconciling TinkerbellMachine {}/{}", namespace, name);

        let mut machine = machine.clone();
        self.ensure_finalizer(&mut machine).await.stage(Stage::AddFinalizer)?;
        let hardware = self.ensure_hardware(&mut machine).await.stage(Stage::EnsureHardware)?;
        self.ensure_template(&hardware, &machine).await.stage(Stage::EnsureTemplate)?;
        self.ensure_workflow(&hardware, &machine).await.stage(Stage::EnsureWorkflow)?;
        self.mark_ready(&mut machine).await.stage(Stage::MarkReady)?;

        Ok(())
    }

    async fn ensure_finalizer(&self, machine: &mut TinkerbellMachine) -> Result<(), ControllerError> {
        if machine.has_finalizer(MACHINE_FINALIZER) {
            return Ok(());
        }

        machine
            .metadata
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(MACHINE_FINALIZER.to_string());

        let (namespace, name) = machine_identity(machine)?;
        let operation = format!("adding finalizer to TinkerbellMachine {namespace}/{name}");
        *machine = self
            .store
            .patch_machine(machine)
            .await
            .map_err(|e| ControllerError::store(operation, e))?;

        debug!("Added finalizer {} to TinkerbellMachine {}", MACHINE_FINALIZER, machine_key(machine));
        Ok(())
    }

    /// Resolves, claims and prepares the machine's hardware, recording the
    /// assignment on the machine.
    async fn ensure_hardware(&self, machine: &mut TinkerbellMachine) -> Result<Hardware, ControllerError> {
        // Resolved first so a machine without bootstrap data never claims hardware
        let bootstrap = self.bootstrap_data(machine).await?;

        let hardware = self.allocate_hardware(machine).await?;
        let hardware = self.claim_hardware(hardware, machine).await?;

        let hardware_name = hardware.metadata.name.clone().unwrap_or_default();
        let provider_id = provider_id(&hardware);

        if machine.hardware_name().is_none() {
            info!("Selected Hardware {} for TinkerbellMachine {}", hardware.key(), machine_key(machine));
        }

        let hardware = self.inject_user_data(hardware, &bootstrap, &provider_id).await?;

        if machine.spec.hardware_name.as_deref() != Some(hardware_name.as_str())
            || machine.spec.provider_id.as_deref() != Some(provider_id.as_str())
        {
            machine.spec.hardware_name = Some(hardware_name);
            machine.spec.provider_id = Some(provider_id);

            let operation = format!("recording hardware on TinkerbellMachine {}", machine_key(machine));
            *machine = self
                .store
                .patch_machine(machine)
                .await
                .map_err(|e| ControllerError::store(operation, e))?;
        }

        self.report_status(Some(&hardware), machine).await?;

        Ok(hardware)
    }

    async fn mark_ready(&self, machine: &mut TinkerbellMachine) -> Result<(), ControllerError> {
        let mut status = machine.status.clone().unwrap_or_default();
        if status.ready {
            debug!("TinkerbellMachine {} already ready", machine_key(machine));
            return Ok(());
        }

        // Only stamped on the transition so repeated passes stay write-free
        status.ready = true;
        status.last_reconciled = Some(chrono::Utc::now());

        let (namespace, name) = machine_identity(machine)?;
        let operation = format!("marking TinkerbellMachine {namespace}/{name} as ready");
        *machine = self
            .store
            .patch_machine_status(namespace, name, &status)
            .await
            .map_err(|e| ControllerError::store(operation, e))?;

        info!("TinkerbellMachine {} is ready", machine_key(machine));
        Ok(())
    }
}

/// `namespace/name` of a machine for log lines and error context
pub(crate) fn machine_key(machine: &TinkerbellMachine) -> String {
    format!(
        "{}/{}",
        machine.metadata.namespace.as_deref().unwrap_or("default"),
        machine.metadata.name.as_deref().unwrap_or_default()
    )
}
