//! TinkerbellCluster CRD
//!
//! Cluster-wide defaults for machines. Only the image lookup fields are
//! consumed here; every field can be overridden per machine.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "TinkerbellCluster",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TinkerbellClusterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_lookup_format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_lookup_base_registry: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_lookup_os_distro: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_lookup_os_version: Option<String>,
}
