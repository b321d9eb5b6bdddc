//! Hardware release for deleted TinkerbellMachines.
//!
//! Undoes the ownership claim on every Hardware object still labelled with
//! the machine, then drops the machine's own finalizer so deletion can
//! proceed. Template and Workflow go away through their owner references.

use crate::error::ControllerError;
use crate::reconciler::{Reconciler, machine_key};
use crds::{HARDWARE_OWNER_NAME_LABEL, HARDWARE_OWNER_NAMESPACE_LABEL, MACHINE_FINALIZER, TinkerbellMachine};
use tracing::{debug, info};

impl Reconciler {
    pub async fn release_machine(&self, machine: &TinkerbellMachine) -> Result<(), ControllerError> {
        for mut hardware in self.owned_hardware(machine).await? {
            if let Some(labels) = hardware.metadata.labels.as_mut() {
                labels.remove(HARDWARE_OWNER_NAME_LABEL);
                labels.remove(HARDWARE_OWNER_NAMESPACE_LABEL);
            }
            if let Some(finalizers) = hardware.metadata.finalizers.as_mut() {
                finalizers.retain(|f| f != MACHINE_FINALIZER);
            }

            self.store.update_hardware(&hardware).await.map_err(|e| {
                if e.is_conflict() {
                    ControllerError::Conflict { hardware: hardware.key() }
                } else {
                    ControllerError::store(format!("releasing Hardware {}", hardware.key()), e)
                }
            })?;

            info!("Released Hardware {} from TinkerbellMachine {}", hardware.key(), machine_key(machine));
        }

        if !machine.has_finalizer(MACHINE_FINALIZER) {
            debug!("TinkerbellMachine {} has no finalizer to remove", machine_key(machine));
            return Ok(());
        }

        let mut machine = machine.clone();
        if let Some(finalizers) = machine.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != MACHINE_FINALIZER);
        }

        self.store
            .patch_machine(&machine)
            .await
            .map_err(|e| ControllerError::store(format!("removing finalizer from TinkerbellMachine {}", machine_key(&machine)), e))?;

        info!("Removed finalizer from TinkerbellMachine {}", machine_key(&machine));
        Ok(())
    }
}
