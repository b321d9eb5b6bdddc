//! Workflow creation for TinkerbellMachines.

use crate::error::ControllerError;
use crate::reconciler::{Reconciler, machine_identity, owner_reference};
use crds::{Hardware, TinkerbellMachine, WORKFLOW_DEVICE_SLOT, Workflow, WorkflowSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use tracing::{debug, info};

impl Reconciler {
    /// Creates the Workflow binding the machine's Template to its hardware,
    /// unless it already exists.
    pub async fn ensure_workflow(&self, hardware: &Hardware, machine: &TinkerbellMachine) -> Result<(), ControllerError> {
        let (namespace, name) = machine_identity(machine)?;

        match self.store.get_workflow(namespace, name).await {
            Ok(_) => {
                debug!("Workflow {}/{} already exists", namespace, name);
                return Ok(());
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(ControllerError::store(format!("checking Workflow {namespace}/{name}"), e)),
        }

        let instance_id = hardware
            .instance_id()
            .ok_or_else(|| ControllerError::MissingInstanceId { hardware: hardware.key() })?;

        let workflow = Workflow {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                owner_references: Some(vec![owner_reference(machine)?]),
                ..Default::default()
            },
            spec: WorkflowSpec {
                template_ref: name.to_string(),
                hardware_map: BTreeMap::from([(WORKFLOW_DEVICE_SLOT.to_string(), instance_id.to_string())]),
            },
        };

        match self.store.create_workflow(&workflow).await {
            Ok(_) => {
                info!("Created Workflow {}/{} for Hardware {}", namespace, name, hardware.key());
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!("Workflow {}/{} created concurrently", namespace, name);
                Ok(())
            }
            Err(e) => Err(ControllerError::store(format!("creating Workflow {namespace}/{name}"), e)),
        }
    }
}
