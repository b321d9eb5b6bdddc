//! Well-known labels and finalizers
//!
//! Ownership of a `Hardware` resource is recorded as a pair of labels naming
//! the owning `TinkerbellMachine`. The absence of [`HARDWARE_OWNER_NAME_LABEL`]
//! means the hardware is unclaimed.

/// Label holding the name of the `TinkerbellMachine` that owns a `Hardware`
pub const HARDWARE_OWNER_NAME_LABEL: &str = "v1alpha1.tinkerbell.org/ownerName";

/// Label holding the namespace of the `TinkerbellMachine` that owns a `Hardware`
pub const HARDWARE_OWNER_NAMESPACE_LABEL: &str = "v1alpha1.tinkerbell.org/ownerNamespace";

/// Finalizer placed on both the machine and its claimed hardware so the
/// hardware is released before the machine disappears
pub const MACHINE_FINALIZER: &str = "tinkerbellmachine.infrastructure.cluster.x-k8s.io";

/// Cluster API label naming the cluster a machine belongs to
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";
