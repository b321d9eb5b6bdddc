//! Template creation for TinkerbellMachines.
//!
//! Each machine gets one Template with its own name and namespace. The body
//! is the machine's template override when set, otherwise the default
//! workflow template rendered for the claimed hardware.

pub mod image;
pub mod render;

use crate::error::ControllerError;
use crate::reconciler::{Reconciler, machine_identity, machine_key, owner_reference};
use crds::{Hardware, Template, TemplateSpec, TinkerbellMachine};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use render::{WorkflowTemplate, first_partition};
use tracing::{debug, info};

impl Reconciler {
    /// Creates the machine's Template unless it already exists.
    ///
    /// Hardware without disks is rejected before anything is written.
    pub async fn ensure_template(&self, hardware: &Hardware, machine: &TinkerbellMachine) -> Result<(), ControllerError> {
        let (namespace, name) = machine_identity(machine)?;

        match self.store.get_template(namespace, name).await {
            Ok(_) => {
                debug!("Template {}/{} already exists", namespace, name);
                return Ok(());
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(ControllerError::store(format!("checking Template {namespace}/{name}"), e)),
        }

        let Some(disk) = hardware.spec.disks.first() else {
            return Err(ControllerError::MissingDiskConfiguration { hardware: hardware.key() });
        };

        let data = match machine.spec.template_override.as_deref().filter(|t| !t.is_empty()) {
            Some(template_override) => template_override.to_string(),
            None => self.default_template(&disk.device, machine).await?,
        };

        let template = Template {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                owner_references: Some(vec![owner_reference(machine)?]),
                ..Default::default()
            },
            spec: TemplateSpec { data: Some(data) },
        };

        match self.store.create_template(&template).await {
            Ok(_) => {
                info!("Created Template {}/{} for Hardware {}", namespace, name, hardware.key());
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!("Template {}/{} created concurrently", namespace, name);
                Ok(())
            }
            Err(e) => Err(ControllerError::store(format!("creating Template {namespace}/{name}"), e)),
        }
    }

    async fn default_template(&self, disk: &str, machine: &TinkerbellMachine) -> Result<String, ControllerError> {
        let kubernetes_version = machine
            .spec
            .version
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ControllerError::render(
                    "image URL",
                    format!("TinkerbellMachine {} has no Kubernetes version", machine_key(machine)),
                )
            })?;

        let image_url = self.image_lookup(machine).await?.image_url(kubernetes_version)?;
        let (_, name) = machine_identity(machine)?;

        WorkflowTemplate {
            name,
            metadata_url: &self.config.metadata_url,
            image_url: &image_url,
            dest_disk: disk,
            dest_partition: &first_partition(disk),
        }
        .render()
    }
}
