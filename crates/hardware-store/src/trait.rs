//! ResourceStore trait for mocking
//!
//! This trait abstracts resource store access so the provisioning pipeline
//! can run against the Kubernetes API or an in-memory mock.

use crate::error::StoreError;
use crate::selector::Selector;
use crds::{Hardware, Template, TinkerbellCluster, TinkerbellMachine, TinkerbellMachineStatus, Workflow};

/// Typed resource store operations used by the machine controller
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// Cancellation is the caller dropping the returned future; each write is a
/// single API request, so it either lands entirely or not at all.
#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    // Hardware
    async fn get_hardware(&self, namespace: &str, name: &str) -> Result<Hardware, StoreError>;

    /// Lists hardware in all namespaces whose labels match `selector`
    async fn list_hardware(&self, selector: &Selector) -> Result<Vec<Hardware>, StoreError>;

    /// Replaces the hardware object, conditioned on `metadata.resourceVersion`
    ///
    /// Fails with [`StoreError::Conflict`] when the stored version differs from
    /// the version carried by `hardware`.
    async fn update_hardware(&self, hardware: &Hardware) -> Result<Hardware, StoreError>;

    /// Sets `spec.userData` on the hardware
    async fn patch_hardware_user_data(&self, namespace: &str, name: &str, user_data: &str) -> Result<Hardware, StoreError>;

    // Templates
    async fn get_template(&self, namespace: &str, name: &str) -> Result<Template, StoreError>;
    async fn create_template(&self, template: &Template) -> Result<Template, StoreError>;

    // Workflows
    async fn get_workflow(&self, namespace: &str, name: &str) -> Result<Workflow, StoreError>;
    async fn create_workflow(&self, workflow: &Workflow) -> Result<Workflow, StoreError>;

    // Machines

    /// Persists the machine's finalizers and its claimed hardware name and provider ID;
    /// the rest of the spec is left as stored
    async fn patch_machine(&self, machine: &TinkerbellMachine) -> Result<TinkerbellMachine, StoreError>;

    /// Persists the machine's status subresource
    async fn patch_machine_status(&self, namespace: &str, name: &str, status: &TinkerbellMachineStatus) -> Result<TinkerbellMachine, StoreError>;

    // Supporting reads
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<TinkerbellCluster, StoreError>;

    /// Reads one key of a Secret as UTF-8 text
    async fn get_secret_value(&self, namespace: &str, name: &str, key: &str) -> Result<String, StoreError>;
}
