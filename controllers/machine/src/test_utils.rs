//! Test utilities for unit testing the provisioning pipeline
//!
//! This module provides helpers for creating test resources and seeding a
//! `MockStore` with them.

use crate::reconciler::{Reconciler, ReconcilerConfig};
use crds::*;
use hardware_store::MockStore;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const TEST_NAMESPACE: &str = "default";
pub const TEST_METADATA_URL: &str = "http://192.168.1.1:50061";
pub const TEST_IMAGE_FORMAT: &str = "{{.BaseRegistry}}/{{.OSDistro}}-{{.OSVersion}}-kube-{{.KubernetesVersion}}.raw.gz";

/// Helper to create a test TinkerbellMachine with bootstrap data and image lookup fields
pub fn create_test_machine(name: &str) -> TinkerbellMachine {
    TinkerbellMachine {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            uid: Some(format!("uid-{name}")),
            ..Default::default()
        },
        spec: TinkerbellMachineSpec {
            image_lookup_format: Some(TEST_IMAGE_FORMAT.to_string()),
            image_lookup_base_registry: Some("ghcr.io/tinkerbell".to_string()),
            image_lookup_os_distro: Some("Ubuntu".to_string()),
            image_lookup_os_version: Some("20.04".to_string()),
            version: Some("v1.23.5".to_string()),
            bootstrap: Bootstrap {
                data: Some("#cloud-config\nprovider-id: PROVIDER_ID\n".to_string()),
                data_secret_name: None,
            },
            ..Default::default()
        },
        status: None,
    }
}

/// Helper to create test Hardware with one NVMe disk, a DHCP address and an instance id
pub fn create_test_hardware(name: &str, labels: &[(&str, &str)]) -> Hardware {
    Hardware {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        },
        spec: HardwareSpec {
            disks: vec![Disk {
                device: "/dev/nvme0n1".to_string(),
            }],
            interfaces: vec![Interface {
                dhcp: Some(Dhcp {
                    mac: Some("3c:ec:ef:4c:4f:54".to_string()),
                    hostname: Some(name.to_string()),
                    ip: Some(Ip {
                        address: "10.71.0.10".to_string(),
                        netmask: Some("255.255.255.0".to_string()),
                        gateway: Some("10.71.0.1".to_string()),
                    }),
                }),
            }],
            metadata: Some(HardwareMetadata {
                instance: Some(MetadataInstance {
                    id: format!("instance-{name}"),
                    hostname: Some(name.to_string()),
                }),
            }),
            user_data: None,
        },
    }
}

/// Helper to build an affinity term from `matchLabels`
pub fn term(labels: &[(&str, &str)]) -> HardwareAffinityTerm {
    HardwareAffinityTerm {
        label_selector: HardwareLabelSelector {
            match_labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            match_expressions: Vec::new(),
        },
    }
}

/// Helper to build a weighted affinity term from `matchLabels`
pub fn preferred(weight: i32, labels: &[(&str, &str)]) -> WeightedHardwareAffinityTerm {
    WeightedHardwareAffinityTerm {
        weight,
        hardware_affinity_term: term(labels),
    }
}

/// Helper to create a reconciler over a mock store
pub fn create_test_reconciler(store: &MockStore) -> Reconciler {
    Reconciler::new(
        Arc::new(store.clone()),
        ReconcilerConfig {
            metadata_url: TEST_METADATA_URL.to_string(),
        },
    )
}

/// Helper to create Hardware already claimed by the named machine
pub fn create_claimed_hardware(name: &str, machine: &str) -> Hardware {
    let mut hardware = create_test_hardware(
        name,
        &[
            (HARDWARE_OWNER_NAME_LABEL, machine),
            (HARDWARE_OWNER_NAMESPACE_LABEL, TEST_NAMESPACE),
        ],
    );
    hardware.metadata.finalizers = Some(vec![MACHINE_FINALIZER.to_string()]);
    hardware
}
