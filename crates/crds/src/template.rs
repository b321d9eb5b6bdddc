//! Template CRD
//!
//! Rendered provisioning instructions. One template exists per
//! `TinkerbellMachine`, sharing its name and namespace.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "tinkerbell.org",
    version = "v1alpha1",
    kind = "Template",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSpec {
    /// Workflow template body (YAML)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}
