//! Hardware CRD
//!
//! A physical machine registered with Tinkerbell out-of-band. The machine
//! controller claims hardware through labels and pushes user data onto it,
//! but never creates or deletes it.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "tinkerbell.org",
    version = "v1alpha1",
    kind = "Hardware",
    plural = "hardware",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct HardwareSpec {
    /// Disks attached to the machine, in boot preference order
    #[serde(default)]
    pub disks: Vec<Disk>,

    /// Network interfaces
    #[serde(default)]
    pub interfaces: Vec<Interface>,

    /// Instance metadata served to the machine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HardwareMetadata>,

    /// Cloud-init user data handed to the machine on boot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Disk {
    /// Block device path, e.g. `/dev/sda`
    pub device: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Interface {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp: Option<Dhcp>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Dhcp {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<Ip>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Ip {
    #[serde(default)]
    pub address: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct HardwareMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<MetadataInstance>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct MetadataInstance {
    /// Opaque instance identifier, used to bind workflows to this hardware
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl Hardware {
    /// Instance identifier from the hardware metadata, if one is recorded
    pub fn instance_id(&self) -> Option<&str> {
        self.spec
            .metadata
            .as_ref()
            .and_then(|m| m.instance.as_ref())
            .map(|i| i.id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// `namespace/name` form used in logs and error messages
    pub fn key(&self) -> String {
        format!(
            "{}/{}",
            self.metadata.namespace.as_deref().unwrap_or_default(),
            self.metadata.name.as_deref().unwrap_or_default()
        )
    }
}
