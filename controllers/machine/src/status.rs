//! Machine address reporting.

use crate::error::ControllerError;
use crate::reconciler::{Reconciler, machine_identity, machine_key};
use crds::{Hardware, MachineAddress, MachineAddressType, TinkerbellMachine};
use std::borrow::Cow;
use tracing::{debug, info};

/// Address of the hardware: the first DHCP address configured on any interface
pub fn hardware_ip(hardware: &Hardware) -> Result<&str, ControllerError> {
    hardware
        .spec
        .interfaces
        .iter()
        .filter_map(|interface| interface.dhcp.as_ref()?.ip.as_ref())
        .map(|ip| ip.address.as_str())
        .find(|address| !address.is_empty())
        .ok_or_else(|| ControllerError::NoHardwareIp { hardware: hardware.key() })
}

impl Reconciler {
    /// Publishes the hardware's address as the machine's only address.
    ///
    /// Without `hardware`, the hardware named in the machine spec is read
    /// from the machine's namespace. The status is only written when the
    /// address list changes; on write the machine is replaced with the
    /// stored object.
    pub async fn report_status(&self, hardware: Option<&Hardware>, machine: &mut TinkerbellMachine) -> Result<(), ControllerError> {
        let (namespace, name) = machine_identity(machine)?;

        let hardware = match hardware {
            Some(hardware) => Cow::Borrowed(hardware),
            None => {
                let hardware_name = machine.hardware_name().ok_or_else(|| ControllerError::NotFound {
                    kind: "Hardware",
                    name: format!("(unassigned) for TinkerbellMachine {namespace}/{name}"),
                })?;

                let fetched = self.store.get_hardware(namespace, hardware_name).await.map_err(|e| {
                    if e.is_not_found() {
                        ControllerError::NotFound {
                            kind: "Hardware",
                            name: format!("{namespace}/{hardware_name}"),
                        }
                    } else {
                        ControllerError::store(format!("reading Hardware {namespace}/{hardware_name}"), e)
                    }
                })?;
                Cow::Owned(fetched)
            }
        };

        let addresses = vec![MachineAddress {
            address_type: MachineAddressType::InternalIP,
            address: hardware_ip(&hardware)?.to_string(),
        }];

        let mut status = machine.status.clone().unwrap_or_default();
        if status.addresses == addresses {
            debug!("TinkerbellMachine {} addresses up to date", machine_key(machine));
            return Ok(());
        }
        status.addresses = addresses;

        let operation = format!("updating status of TinkerbellMachine {namespace}/{name}");
        let updated = self
            .store
            .patch_machine_status(namespace, name, &status)
            .await
            .map_err(|e| ControllerError::store(operation, e))?;

        info!(
            "TinkerbellMachine {} reachable at {}",
            machine_key(machine),
            hardware_ip(&hardware)?
        );
        *machine = updated;
        Ok(())
    }
}
