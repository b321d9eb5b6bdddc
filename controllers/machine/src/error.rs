//! Controller-specific error types.
//!
//! Errors are a closed set of kinds carrying the context needed to act on
//! them. Pipeline stages wrap whatever they return in [`ControllerError::Stage`];
//! use [`ControllerError::innermost`] to match on the underlying kind.

use hardware_store::{SelectorError, StoreError};
use std::fmt;
use thiserror::Error;

/// A step of the machine reconciliation pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AddFinalizer,
    EnsureHardware,
    EnsureTemplate,
    EnsureWorkflow,
    MarkReady,
    Release,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AddFinalizer => "adding finalizer",
            Self::EnsureHardware => "ensuring hardware",
            Self::EnsureTemplate => "ensuring template",
            Self::EnsureWorkflow => "ensuring workflow",
            Self::MarkReady => "marking machine as ready",
            Self::Release => "releasing hardware",
        };
        f.write_str(s)
    }
}

/// Errors that can occur in the Tinkerbell machine controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// A pipeline stage failed
    #[error("{stage}: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<ControllerError>,
    },

    /// No unclaimed hardware satisfies the machine's affinity
    #[error("no hardware available for machine {machine}")]
    NoHardwareAvailable { machine: String },

    /// An affinity term carries a malformed label selector
    #[error("invalid label selector {selector}: {source}")]
    Selector {
        selector: String,
        #[source]
        source: SelectorError,
    },

    /// The chosen hardware has no disks to install onto
    #[error("hardware {hardware}: disk configuration is required")]
    MissingDiskConfiguration { hardware: String },

    /// The hardware has no instance identifier to bind a workflow to
    #[error("hardware {hardware}: metadata.instance.id is required")]
    MissingInstanceId { hardware: String },

    /// The hardware exposes no DHCP address
    #[error("hardware {hardware}: no IP address configured")]
    NoHardwareIp { hardware: String },

    /// Template or image URL rendering failed
    #[error("rendering {context}: {message}")]
    Render { context: String, message: String },

    /// Another writer claimed the hardware first; the whole pass must restart
    #[error("conflict claiming hardware {hardware}")]
    Conflict { hardware: String },

    /// A referenced resource does not exist
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    /// The machine's bootstrap data is not available yet
    #[error("bootstrap data for machine {machine} is not ready")]
    BootstrapDataNotReady { machine: String },

    /// Resource store failure
    #[error("{operation}: {source}")]
    Store {
        operation: String,
        #[source]
        source: StoreError,
    },

    /// Kubernetes client setup failed
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Health probe server failed
    #[error("Probe server failed: {0}")]
    Probe(String),
}

impl ControllerError {
    /// Wraps a store error with a description of the failed operation
    pub fn store(operation: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            operation: operation.into(),
            source,
        }
    }

    pub fn render(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Render {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// The error with all stage wrappers peeled off
    pub fn innermost(&self) -> &ControllerError {
        let mut current = self;
        while let Self::Stage { source, .. } = current {
            current = source;
        }
        current
    }

    /// Whether the failure was lost optimistic-concurrency race
    pub fn is_conflict(&self) -> bool {
        match self.innermost() {
            Self::Conflict { .. } => true,
            Self::Store { source, .. } => source.is_conflict(),
            _ => false,
        }
    }
}

/// Attaches pipeline stage context to results
pub trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T, ControllerError>;
}

impl<T> StageExt<T> for Result<T, ControllerError> {
    fn stage(self, stage: Stage) -> Result<T, ControllerError> {
        self.map_err(|source| ControllerError::Stage {
            stage,
            source: Box::new(source),
        })
    }
}
