//! Exclusive hardware ownership.
//!
//! Ownership is the pair of owner labels plus the machine finalizer on the
//! Hardware object. The claim is a version-conditioned update, so of two
//! machines racing for the same unit exactly one write lands; the loser
//! gets [`ControllerError::Conflict`] and must restart its pass from
//! allocation, where the unit no longer shows up as a candidate.

use crate::error::ControllerError;
use crate::reconciler::{Reconciler, machine_identity, machine_key};
use crds::{HARDWARE_OWNER_NAME_LABEL, HARDWARE_OWNER_NAMESPACE_LABEL, Hardware, MACHINE_FINALIZER, TinkerbellMachine};
use tracing::{debug, info, warn};

fn has_finalizer(hardware: &Hardware) -> bool {
    hardware
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == MACHINE_FINALIZER))
}

fn owned_by(hardware: &Hardware, namespace: &str, name: &str) -> bool {
    hardware.metadata.labels.as_ref().is_some_and(|labels| {
        labels.get(HARDWARE_OWNER_NAME_LABEL).map(String::as_str) == Some(name)
            && labels.get(HARDWARE_OWNER_NAMESPACE_LABEL).map(String::as_str) == Some(namespace)
    })
}

impl Reconciler {
    /// Marks the hardware as owned by the machine.
    ///
    /// Returns the stored object after the write, or the input unchanged when
    /// the ownership markers are already in place.
    pub async fn claim_hardware(&self, mut hardware: Hardware, machine: &TinkerbellMachine) -> Result<Hardware, ControllerError> {
        let (namespace, name) = machine_identity(machine)?;

        if owned_by(&hardware, namespace, name) && has_finalizer(&hardware) {
            debug!("Hardware {} already owned by TinkerbellMachine {}", hardware.key(), machine_key(machine));
            return Ok(hardware);
        }

        let labels = hardware.metadata.labels.get_or_insert_with(Default::default);
        labels.insert(HARDWARE_OWNER_NAME_LABEL.to_string(), name.to_string());
        labels.insert(HARDWARE_OWNER_NAMESPACE_LABEL.to_string(), namespace.to_string());

        if !has_finalizer(&hardware) {
            hardware
                .metadata
                .finalizers
                .get_or_insert_with(Vec::new)
                .push(MACHINE_FINALIZER.to_string());
        }

        match self.store.update_hardware(&hardware).await {
            Ok(claimed) => {
                info!("TinkerbellMachine {} claimed Hardware {}", machine_key(machine), claimed.key());
                Ok(claimed)
            }
            Err(e) if e.is_conflict() => {
                warn!(
                    "TinkerbellMachine {} lost the race for Hardware {}, restarting allocation",
                    machine_key(machine),
                    hardware.key()
                );
                Err(ControllerError::Conflict { hardware: hardware.key() })
            }
            Err(e) => Err(ControllerError::store(format!("claiming Hardware {}", hardware.key()), e)),
        }
    }
}
