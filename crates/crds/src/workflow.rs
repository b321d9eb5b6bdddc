//! Workflow CRD
//!
//! Binds a `Template` to concrete hardware through the hardware map.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Logical device slot that templates use to address the target machine
pub const WORKFLOW_DEVICE_SLOT: &str = "device_1";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "tinkerbell.org",
    version = "v1alpha1",
    kind = "Workflow",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    /// Name of the `Template` to execute
    pub template_ref: String,

    /// Logical device slot -> hardware instance identifier
    #[serde(default)]
    pub hardware_map: BTreeMap<String, String>,
}
