//! TinkerbellMachine CRD
//!
//! Requests one piece of hardware to be provisioned and join a cluster.
//! The controller fills in `hardwareName` and `providerID` once hardware
//! has been claimed, and reports addresses and readiness through status.

use crate::affinity::HardwareAffinity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "TinkerbellMachine",
    namespaced,
    status = "TinkerbellMachineStatus",
    printcolumn = r#"{"name":"Hardware","type":"string","jsonPath":".spec.hardwareName"}"#,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TinkerbellMachineSpec {
    /// Provider identifier, `tinkerbell://{namespace}/{name}` of the claimed hardware
    #[serde(default, rename = "providerID", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    /// Name of the claimed `Hardware` (same namespace as the hardware's provider ID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_name: Option<String>,

    /// Constraints used when selecting hardware
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_affinity: Option<HardwareAffinity>,

    /// Verbatim workflow template, replacing the generated default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_override: Option<String>,

    /// Image URL format, e.g. `{{.BaseRegistry}}/{{.OSDistro}}-{{.OSVersion}}.raw.gz`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_lookup_format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_lookup_base_registry: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_lookup_os_distro: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_lookup_os_version: Option<String>,

    /// Kubernetes version the machine should run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Where the bootstrap (cloud-init) configuration comes from
    #[serde(default)]
    pub bootstrap: Bootstrap,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Bootstrap {
    /// Inline bootstrap data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    /// Secret in the machine's namespace whose `value` key holds the bootstrap data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_secret_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TinkerbellMachineStatus {
    /// Whether the machine's template and workflow are in place
    #[serde(default)]
    pub ready: bool,

    /// Addresses of the claimed hardware
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<MachineAddress>,

    /// Last successful reconciliation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MachineAddress {
    #[serde(rename = "type")]
    pub address_type: MachineAddressType,

    pub address: String,
}

/// Cluster API node address types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum MachineAddressType {
    Hostname,
    ExternalIP,
    InternalIP,
    ExternalDNS,
    InternalDNS,
}

impl TinkerbellMachine {
    /// Assigned hardware name, treating an empty string as unassigned
    pub fn hardware_name(&self) -> Option<&str> {
        self.spec.hardware_name.as_deref().filter(|n| !n.is_empty())
    }

    /// Whether the finalizer is already recorded on the object
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == finalizer))
    }
}
