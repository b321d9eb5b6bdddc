//! Mock ResourceStore for unit testing
//!
//! Stores resources in memory with Kubernetes-like semantics:
//! - every write bumps a store-wide resource version
//! - `update_hardware` is rejected with `Conflict` when the caller's
//!   `resourceVersion` is stale
//! - creates are rejected with `AlreadyExists` for duplicate identities
//! - `patch_machine` only touches finalizers and the claimed hardware fields
//!
//! Every write is recorded so tests can assert on what the pipeline touched.
//! Failures can be queued per operation with [`MockStore::fail_next`].

use crate::error::StoreError;
use crate::selector::Selector;
use crate::store_trait::ResourceStore;
use crds::{Hardware, Template, TinkerbellCluster, TinkerbellMachine, TinkerbellMachineStatus, Workflow};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Key = (String, String);

/// A write observed by the mock store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub operation: &'static str,
    pub kind: &'static str,
    pub key: String,
}

/// A failure queued for the next matching call
#[derive(Debug)]
struct InjectedFailure {
    operation: &'static str,
    kind: &'static str,
    error: StoreError,
}

/// In-memory resource store for tests
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    hardware: Arc<Mutex<BTreeMap<Key, Hardware>>>,
    templates: Arc<Mutex<BTreeMap<Key, Template>>>,
    workflows: Arc<Mutex<BTreeMap<Key, Workflow>>>,
    machines: Arc<Mutex<BTreeMap<Key, TinkerbellMachine>>>,
    clusters: Arc<Mutex<BTreeMap<Key, TinkerbellCluster>>>,
    secrets: Arc<Mutex<BTreeMap<Key, BTreeMap<String, String>>>>,
    version: Arc<AtomicU64>,
    writes: Arc<Mutex<Vec<WriteRecord>>>,
    failures: Arc<Mutex<Vec<InjectedFailure>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn key_of(kind: &str, meta: &ObjectMeta) -> Result<Key, StoreError> {
    match (&meta.namespace, &meta.name) {
        (Some(namespace), Some(name)) => Ok((namespace.clone(), name.clone())),
        _ => Err(StoreError::InvalidObject(format!("{kind} is missing a namespace or name"))),
    }
}

fn display((namespace, name): &Key) -> String {
    format!("{namespace}/{name}")
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

impl MockStore {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn record(&self, operation: &'static str, kind: &'static str, key: &Key) {
        lock(&self.writes).push(WriteRecord {
            operation,
            kind,
            key: display(key),
        });
    }

    /// Makes the next `operation` on `kind` fail with `error`.
    ///
    /// Operations are named like the write log (`get`, `list`, `update`,
    /// `patch`, `patch_status`, `create`). The failing call changes nothing
    /// and is not recorded as a write.
    pub fn fail_next(&self, operation: &'static str, kind: &'static str, error: StoreError) {
        lock(&self.failures).push(InjectedFailure { operation, kind, error });
    }

    fn injected(&self, operation: &str, kind: &str) -> Result<(), StoreError> {
        let mut failures = lock(&self.failures);
        match failures.iter().position(|f| f.operation == operation && f.kind == kind) {
            Some(index) => Err(failures.remove(index).error),
            None => Ok(()),
        }
    }

    /// Add hardware to the mock store (for test setup, not recorded as a write)
    pub fn add_hardware(&self, mut hardware: Hardware) {
        hardware.metadata.resource_version = Some(self.next_version());
        if let Ok(key) = key_of("Hardware", &hardware.metadata) {
            lock(&self.hardware).insert(key, hardware);
        }
    }

    /// Add a machine to the mock store (for test setup)
    pub fn add_machine(&self, mut machine: TinkerbellMachine) {
        machine.metadata.resource_version = Some(self.next_version());
        if let Ok(key) = key_of("TinkerbellMachine", &machine.metadata) {
            lock(&self.machines).insert(key, machine);
        }
    }

    /// Add a cluster to the mock store (for test setup)
    pub fn add_cluster(&self, cluster: TinkerbellCluster) {
        if let Ok(key) = key_of("TinkerbellCluster", &cluster.metadata) {
            lock(&self.clusters).insert(key, cluster);
        }
    }

    /// Add a template to the mock store (for test setup)
    pub fn add_template(&self, template: Template) {
        if let Ok(key) = key_of("Template", &template.metadata) {
            lock(&self.templates).insert(key, template);
        }
    }

    /// Add a secret key/value to the mock store (for test setup)
    pub fn add_secret_value(&self, namespace: &str, name: &str, secret_key: &str, value: &str) {
        lock(&self.secrets)
            .entry(key(namespace, name))
            .or_default()
            .insert(secret_key.to_string(), value.to_string());
    }

    pub fn hardware(&self, namespace: &str, name: &str) -> Option<Hardware> {
        lock(&self.hardware).get(&key(namespace, name)).cloned()
    }

    pub fn template(&self, namespace: &str, name: &str) -> Option<Template> {
        lock(&self.templates).get(&key(namespace, name)).cloned()
    }

    pub fn workflow(&self, namespace: &str, name: &str) -> Option<Workflow> {
        lock(&self.workflows).get(&key(namespace, name)).cloned()
    }

    pub fn machine(&self, namespace: &str, name: &str) -> Option<TinkerbellMachine> {
        lock(&self.machines).get(&key(namespace, name)).cloned()
    }

    /// All writes observed so far, in order
    pub fn writes(&self) -> Vec<WriteRecord> {
        lock(&self.writes).clone()
    }

    /// Number of writes observed for a resource kind
    pub fn write_count(&self, kind: &str) -> usize {
        lock(&self.writes).iter().filter(|w| w.kind == kind).count()
    }

    /// Forget recorded writes (stored objects are kept)
    pub fn clear_writes(&self) {
        lock(&self.writes).clear();
    }
}

#[async_trait::async_trait]
impl ResourceStore for MockStore {
    async fn get_hardware(&self, namespace: &str, name: &str) -> Result<Hardware, StoreError> {
        self.injected("get", "Hardware")?;
        self.hardware(namespace, name).ok_or_else(|| StoreError::NotFound {
            kind: "Hardware",
            key: format!("{namespace}/{name}"),
        })
    }

    async fn list_hardware(&self, selector: &Selector) -> Result<Vec<Hardware>, StoreError> {
        self.injected("list", "Hardware")?;
        Ok(lock(&self.hardware)
            .values()
            .filter(|hw| selector.matches(hw.metadata.labels.as_ref().unwrap_or(&BTreeMap::new())))
            .cloned()
            .collect())
    }

    async fn update_hardware(&self, hardware: &Hardware) -> Result<Hardware, StoreError> {
        self.injected("update", "Hardware")?;
        let key = key_of("Hardware", &hardware.metadata)?;
        let mut stored = lock(&self.hardware);

        let current = stored.get(&key).ok_or_else(|| StoreError::NotFound {
            kind: "Hardware",
            key: display(&key),
        })?;

        let expected = hardware.metadata.resource_version.as_deref().ok_or_else(|| {
            StoreError::InvalidObject(format!("Hardware {} has no resourceVersion", display(&key)))
        })?;

        if current.metadata.resource_version.as_deref() != Some(expected) {
            return Err(StoreError::Conflict {
                kind: "Hardware",
                key: display(&key),
            });
        }

        let mut updated = hardware.clone();
        updated.metadata.resource_version = Some(self.next_version());
        stored.insert(key.clone(), updated.clone());
        drop(stored);

        self.record("update", "Hardware", &key);
        Ok(updated)
    }

    async fn patch_hardware_user_data(&self, namespace: &str, name: &str, user_data: &str) -> Result<Hardware, StoreError> {
        self.injected("patch", "Hardware")?;
        let key = key(namespace, name);
        let mut stored = lock(&self.hardware);

        let hardware = stored.get_mut(&key).ok_or_else(|| StoreError::NotFound {
            kind: "Hardware",
            key: display(&key),
        })?;
        hardware.spec.user_data = Some(user_data.to_string());
        hardware.metadata.resource_version = Some(self.next_version());
        let patched = hardware.clone();
        drop(stored);

        self.record("patch", "Hardware", &key);
        Ok(patched)
    }

    async fn get_template(&self, namespace: &str, name: &str) -> Result<Template, StoreError> {
        self.injected("get", "Template")?;
        self.template(namespace, name).ok_or_else(|| StoreError::NotFound {
            kind: "Template",
            key: format!("{namespace}/{name}"),
        })
    }

    async fn create_template(&self, template: &Template) -> Result<Template, StoreError> {
        self.injected("create", "Template")?;
        let key = key_of("Template", &template.metadata)?;
        let mut stored = lock(&self.templates);
        if stored.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: "Template",
                key: display(&key),
            });
        }

        let mut created = template.clone();
        created.metadata.resource_version = Some(self.next_version());
        stored.insert(key.clone(), created.clone());
        drop(stored);

        self.record("create", "Template", &key);
        Ok(created)
    }

    async fn get_workflow(&self, namespace: &str, name: &str) -> Result<Workflow, StoreError> {
        self.injected("get", "Workflow")?;
        self.workflow(namespace, name).ok_or_else(|| StoreError::NotFound {
            kind: "Workflow",
            key: format!("{namespace}/{name}"),
        })
    }

    async fn create_workflow(&self, workflow: &Workflow) -> Result<Workflow, StoreError> {
        self.injected("create", "Workflow")?;
        let key = key_of("Workflow", &workflow.metadata)?;
        let mut stored = lock(&self.workflows);
        if stored.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: "Workflow",
                key: display(&key),
            });
        }

        let mut created = workflow.clone();
        created.metadata.resource_version = Some(self.next_version());
        stored.insert(key.clone(), created.clone());
        drop(stored);

        self.record("create", "Workflow", &key);
        Ok(created)
    }

    async fn patch_machine(&self, machine: &TinkerbellMachine) -> Result<TinkerbellMachine, StoreError> {
        self.injected("patch", "TinkerbellMachine")?;
        let key = key_of("TinkerbellMachine", &machine.metadata)?;
        let mut stored = lock(&self.machines);

        let current = stored.get_mut(&key).ok_or_else(|| StoreError::NotFound {
            kind: "TinkerbellMachine",
            key: display(&key),
        })?;
        current.metadata.finalizers.clone_from(&machine.metadata.finalizers);
        if let Some(hardware_name) = &machine.spec.hardware_name {
            current.spec.hardware_name = Some(hardware_name.clone());
        }
        if let Some(provider_id) = &machine.spec.provider_id {
            current.spec.provider_id = Some(provider_id.clone());
        }
        current.metadata.resource_version = Some(self.next_version());
        let patched = current.clone();
        drop(stored);

        self.record("patch", "TinkerbellMachine", &key);
        Ok(patched)
    }

    async fn patch_machine_status(&self, namespace: &str, name: &str, status: &TinkerbellMachineStatus) -> Result<TinkerbellMachine, StoreError> {
        self.injected("patch_status", "TinkerbellMachine")?;
        let key = key(namespace, name);
        let mut stored = lock(&self.machines);

        let current = stored.get_mut(&key).ok_or_else(|| StoreError::NotFound {
            kind: "TinkerbellMachine",
            key: display(&key),
        })?;
        current.status = Some(status.clone());
        current.metadata.resource_version = Some(self.next_version());
        let patched = current.clone();
        drop(stored);

        self.record("patch_status", "TinkerbellMachine", &key);
        Ok(patched)
    }

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<TinkerbellCluster, StoreError> {
        self.injected("get", "TinkerbellCluster")?;
        lock(&self.clusters)
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "TinkerbellCluster",
                key: format!("{namespace}/{name}"),
            })
    }

    async fn get_secret_value(&self, namespace: &str, name: &str, key: &str) -> Result<String, StoreError> {
        self.injected("get", "Secret")?;
        lock(&self.secrets)
            .get(&(namespace.to_string(), name.to_string()))
            .and_then(|data| data.get(key).cloned())
            .ok_or_else(|| StoreError::NotFound {
                kind: "Secret key",
                key: format!("{namespace}/{name}/{key}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::Requirement;
    use crds::{HardwareSpec, TemplateSpec, TinkerbellMachineSpec};

    fn hardware(name: &str, labels: &[(&str, &str)]) -> Hardware {
        let mut hw = Hardware::new(name, HardwareSpec::default());
        hw.metadata.namespace = Some("default".to_string());
        hw.metadata.labels = Some(labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect());
        hw
    }

    #[tokio::test]
    async fn test_stale_update_is_rejected_with_conflict() {
        let store = MockStore::new();
        store.add_hardware(hardware("hw-a", &[]));

        let first_read = store.get_hardware("default", "hw-a").await.unwrap();
        let second_read = store.get_hardware("default", "hw-a").await.unwrap();

        let mut winner = first_read.clone();
        winner.metadata.labels = Some(BTreeMap::from([("owner".to_string(), "m1".to_string())]));
        store.update_hardware(&winner).await.unwrap();

        let mut loser = second_read.clone();
        loser.metadata.labels = Some(BTreeMap::from([("owner".to_string(), "m2".to_string())]));
        let err = store.update_hardware(&loser).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { kind: "Hardware", .. }));

        let stored = store.hardware("default", "hw-a").unwrap();
        assert_eq!(stored.metadata.labels.unwrap()["owner"], "m1");
        assert_eq!(store.write_count("Hardware"), 1);
    }

    #[tokio::test]
    async fn test_user_data_patch_bumps_version() {
        let store = MockStore::new();
        store.add_hardware(hardware("hw-a", &[]));
        let before = store.get_hardware("default", "hw-a").await.unwrap();

        let patched = store
            .patch_hardware_user_data("default", "hw-a", "#cloud-config")
            .await
            .unwrap();

        assert_eq!(patched.spec.user_data.as_deref(), Some("#cloud-config"));
        assert_ne!(patched.metadata.resource_version, before.metadata.resource_version);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_already_exists() {
        let store = MockStore::new();
        let mut template = Template::new("m1", TemplateSpec { data: Some("x".to_string()) });
        template.metadata.namespace = Some("default".to_string());

        store.create_template(&template).await.unwrap();
        let err = store.create_template(&template).await.unwrap_err();

        assert!(err.is_already_exists());
        assert_eq!(store.write_count("Template"), 1);
    }

    #[tokio::test]
    async fn test_list_filters_by_selector() {
        let store = MockStore::new();
        store.add_hardware(hardware("hw-a", &[("rack", "a")]));
        store.add_hardware(hardware("hw-b", &[("rack", "b")]));
        store.add_hardware(hardware("hw-c", &[("rack", "a"), ("owner", "m1")]));

        let selector = Selector::from_labels([("rack", "a")])
            .unwrap()
            .with(Requirement::does_not_exist("owner").unwrap());

        let names: Vec<_> = store
            .list_hardware(&selector)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|hw| hw.metadata.name)
            .collect();

        assert_eq!(names, vec!["hw-a".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_objects_are_not_found() {
        let store = MockStore::new();
        assert!(store.get_hardware("default", "nope").await.unwrap_err().is_not_found());
        assert!(store.get_workflow("default", "nope").await.unwrap_err().is_not_found());
        assert!(store.get_secret_value("default", "nope", "value").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_queued_failure_hits_only_the_next_matching_call() {
        let store = MockStore::new();
        store.add_hardware(hardware("hw-a", &[]));
        store.fail_next(
            "get",
            "Hardware",
            StoreError::InvalidObject("api server unavailable".to_string()),
        );

        assert!(store.get_workflow("default", "nope").await.unwrap_err().is_not_found());
        assert!(matches!(
            store.get_hardware("default", "hw-a").await,
            Err(StoreError::InvalidObject(_))
        ));
        assert!(store.get_hardware("default", "hw-a").await.is_ok());
    }

    #[tokio::test]
    async fn test_machine_patch_keeps_concurrent_spec_edits() {
        let store = MockStore::new();
        let mut machine = TinkerbellMachine::new("m1", TinkerbellMachineSpec::default());
        machine.metadata.namespace = Some("default".to_string());
        store.add_machine(machine.clone());

        let mut edited = store.machine("default", "m1").unwrap();
        edited.spec.template_override = Some("user edit".to_string());
        store.add_machine(edited);

        machine.metadata.finalizers = Some(vec!["machine.tinkerbell.org".to_string()]);
        machine.spec.hardware_name = Some("hw-a".to_string());
        let patched = store.patch_machine(&machine).await.unwrap();

        assert_eq!(patched.spec.template_override.as_deref(), Some("user edit"));
        assert_eq!(patched.spec.hardware_name.as_deref(), Some("hw-a"));
        assert_eq!(patched.metadata.finalizers, machine.metadata.finalizers);
    }
}
