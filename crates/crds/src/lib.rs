//! Tinkerbell provisioning CRD Definitions
//!
//! Kubernetes Custom Resource Definitions consumed and produced by the
//! Tinkerbell machine controller:
//! - `TinkerbellMachine` / `TinkerbellCluster`: Cluster API infrastructure resources
//! - `Hardware`: pre-registered physical machines
//! - `Template` / `Workflow`: provisioning instructions bound to hardware

pub mod affinity;
pub mod hardware;
pub mod labels;
pub mod template;
pub mod tinkerbell_cluster;
pub mod tinkerbell_machine;
pub mod workflow;

pub use affinity::*;
pub use hardware::*;
pub use labels::*;
pub use template::*;
pub use tinkerbell_cluster::*;
pub use tinkerbell_machine::*;
pub use workflow::*;
