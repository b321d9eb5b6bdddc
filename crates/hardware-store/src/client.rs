//! Kubernetes-backed resource store
//!
//! Implements [`ResourceStore`] over `kube::Api`. Conditioned hardware
//! writes use `replace`, which the API server rejects with 409 when the
//! object's `resourceVersion` is stale; every other write is a JSON merge
//! patch or a plain create.

use crate::error::StoreError;
use crate::selector::Selector;
use crate::store_trait::ResourceStore;
use crds::{Hardware, Template, TinkerbellCluster, TinkerbellMachine, TinkerbellMachineStatus, Workflow};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::{Map, Value, json};
use tracing::debug;

/// Merge patch for the machine fields the controller owns.
///
/// Only the finalizers and the spec fields recording the claimed hardware
/// are sent, so concurrent edits to the rest of the spec survive.
pub(crate) fn machine_patch(machine: &TinkerbellMachine) -> Value {
    let mut spec = Map::new();
    if let Some(hardware_name) = &machine.spec.hardware_name {
        spec.insert("hardwareName".to_string(), json!(hardware_name));
    }
    if let Some(provider_id) = &machine.spec.provider_id {
        spec.insert("providerID".to_string(), json!(provider_id));
    }

    let mut patch = json!({
        "metadata": {
            "finalizers": machine.metadata.finalizers.clone().unwrap_or_default()
        }
    });
    if !spec.is_empty() {
        patch["spec"] = Value::Object(spec);
    }
    patch
}

/// Resource store talking to the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn hardware_api(&self, namespace: &str) -> Api<Hardware> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn object_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Maps read/patch errors: 404 becomes `NotFound`
fn read_error(kind: &'static str, namespace: &str, name: &str, error: kube::Error) -> StoreError {
    match error {
        kube::Error::Api(ref ae) if ae.code == 404 => StoreError::NotFound {
            kind,
            key: object_key(namespace, name),
        },
        other => StoreError::Kube(other),
    }
}

/// Maps conditioned-update errors: 409 becomes `Conflict`
fn update_error(kind: &'static str, namespace: &str, name: &str, error: kube::Error) -> StoreError {
    match error {
        kube::Error::Api(ref ae) if ae.code == 409 => StoreError::Conflict {
            kind,
            key: object_key(namespace, name),
        },
        other => read_error(kind, namespace, name, other),
    }
}

/// Maps create errors: 409 becomes `AlreadyExists`
fn create_error(kind: &'static str, namespace: &str, name: &str, error: kube::Error) -> StoreError {
    match error {
        kube::Error::Api(ref ae) if ae.code == 409 => StoreError::AlreadyExists {
            kind,
            key: object_key(namespace, name),
        },
        other => StoreError::Kube(other),
    }
}

fn identity<'a>(kind: &str, meta: &'a ObjectMeta) -> Result<(&'a str, &'a str), StoreError> {
    let namespace = meta
        .namespace
        .as_deref()
        .ok_or_else(|| StoreError::InvalidObject(format!("{kind} is missing a namespace")))?;
    let name = meta
        .name
        .as_deref()
        .ok_or_else(|| StoreError::InvalidObject(format!("{kind} is missing a name")))?;
    Ok((namespace, name))
}

#[async_trait::async_trait]
impl ResourceStore for KubeStore {
    async fn get_hardware(&self, namespace: &str, name: &str) -> Result<Hardware, StoreError> {
        self.hardware_api(namespace)
            .get(name)
            .await
            .map_err(|e| read_error("Hardware", namespace, name, e))
    }

    async fn list_hardware(&self, selector: &Selector) -> Result<Vec<Hardware>, StoreError> {
        let api: Api<Hardware> = Api::all(self.client.clone());
        let mut params = ListParams::default();
        if !selector.is_empty() {
            params = params.labels(&selector.to_string());
        }

        debug!(selector = %selector, "Listing hardware");
        let list = api.list(&params).await?;
        Ok(list.items)
    }

    async fn update_hardware(&self, hardware: &Hardware) -> Result<Hardware, StoreError> {
        let (namespace, name) = identity("Hardware", &hardware.metadata)?;
        if hardware.metadata.resource_version.is_none() {
            return Err(StoreError::InvalidObject(format!(
                "Hardware {namespace}/{name} has no resourceVersion; refusing an unconditioned update"
            )));
        }

        self.hardware_api(namespace)
            .replace(name, &PostParams::default(), hardware)
            .await
            .map_err(|e| update_error("Hardware", namespace, name, e))
    }

    async fn patch_hardware_user_data(&self, namespace: &str, name: &str, user_data: &str) -> Result<Hardware, StoreError> {
        let patch = json!({
            "spec": {
                "userData": user_data
            }
        });

        self.hardware_api(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| read_error("Hardware", namespace, name, e))
    }

    async fn get_template(&self, namespace: &str, name: &str) -> Result<Template, StoreError> {
        let api: Api<Template> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| read_error("Template", namespace, name, e))
    }

    async fn create_template(&self, template: &Template) -> Result<Template, StoreError> {
        let (namespace, name) = identity("Template", &template.metadata)?;
        let api: Api<Template> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), template)
            .await
            .map_err(|e| create_error("Template", namespace, name, e))
    }

    async fn get_workflow(&self, namespace: &str, name: &str) -> Result<Workflow, StoreError> {
        let api: Api<Workflow> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| read_error("Workflow", namespace, name, e))
    }

    async fn create_workflow(&self, workflow: &Workflow) -> Result<Workflow, StoreError> {
        let (namespace, name) = identity("Workflow", &workflow.metadata)?;
        let api: Api<Workflow> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), workflow)
            .await
            .map_err(|e| create_error("Workflow", namespace, name, e))
    }

    async fn patch_machine(&self, machine: &TinkerbellMachine) -> Result<TinkerbellMachine, StoreError> {
        let (namespace, name) = identity("TinkerbellMachine", &machine.metadata)?;
        let patch = machine_patch(machine);

        let api: Api<TinkerbellMachine> = Api::namespaced(self.client.clone(), namespace);
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| read_error("TinkerbellMachine", namespace, name, e))
    }

    async fn patch_machine_status(&self, namespace: &str, name: &str, status: &TinkerbellMachineStatus) -> Result<TinkerbellMachine, StoreError> {
        let patch = json!({
            "status": status
        });

        let api: Api<TinkerbellMachine> = Api::namespaced(self.client.clone(), namespace);
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| read_error("TinkerbellMachine", namespace, name, e))
    }

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<TinkerbellCluster, StoreError> {
        let api: Api<TinkerbellCluster> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| read_error("TinkerbellCluster", namespace, name, e))
    }

    async fn get_secret_value(&self, namespace: &str, name: &str, key: &str) -> Result<String, StoreError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api
            .get(name)
            .await
            .map_err(|e| read_error("Secret", namespace, name, e))?;

        let bytes = secret
            .data
            .and_then(|mut data| data.remove(key))
            .ok_or_else(|| StoreError::NotFound {
                kind: "Secret key",
                key: format!("{}/{key}", object_key(namespace, name)),
            })?;

        String::from_utf8(bytes.0).map_err(|e| {
            StoreError::InvalidObject(format!("Secret {namespace}/{name} key {key} is not UTF-8: {e}"))
        })
    }
}
