//! Resource store errors

use thiserror::Error;

/// Errors that can occur when reading or writing resources
#[derive(Debug, Error)]
pub enum StoreError {
    /// Resource does not exist
    #[error("Not found: {kind} {key}")]
    NotFound { kind: &'static str, key: String },

    /// Conditioned write rejected because the stored version moved on
    #[error("Conflict writing {kind} {key}: resource version changed since it was read")]
    Conflict { kind: &'static str, key: String },

    /// Create rejected because the resource is already present
    #[error("Already exists: {kind} {key}")]
    AlreadyExists { kind: &'static str, key: String },

    /// Object is missing data required to address or write it
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// Kubernetes API transport or server error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}
