//! Resource store access for the Tinkerbell machine controller
//!
//! The controller talks to the Kubernetes API only through the
//! [`ResourceStore`] trait, which exposes exactly the typed reads and
//! writes the provisioning pipeline needs:
//!
//! - **Hardware**: label-selector listing, version-conditioned updates
//!   (ownership claims) and user-data patches
//! - **Templates / Workflows**: get and create
//! - **Machines**: spec/finalizer and status patches
//!
//! [`KubeStore`] implements the trait over `kube::Api`; with the `test-util`
//! feature an in-memory `MockStore` with the same optimistic-concurrency
//! semantics is available for unit tests.
//!
//! Label selectors are compiled and validated by the [`selector`] module.

pub mod client;
pub mod error;
pub mod selector;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeStore;
pub use error::StoreError;
pub use selector::{Selector, SelectorError};
pub use store_trait::ResourceStore;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockStore, WriteRecord};
