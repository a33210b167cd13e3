/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Error types for the trash bin

use thiserror::Error;

use crate::store::ObjectRef;

/// Result type for operator operations
pub type Result<T> = std::result::Result<T, TrashError>;

/// Top level errors raised by the operator and its wiring
#[derive(Error, Debug)]
pub enum TrashError {
    /// Kubernetes client error
    #[error("Kubernetes client error: {0}")]
    KubernetesClient(#[from] kube::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Prune(#[from] PruneError),

    #[error(transparent)]
    Restore(#[from] RestoreError),
}

/// Errors returned by the record and object stores
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("Store error: {0}")]
    Other(String),
}

impl StoreError {
    /// Map a Kubernetes API error onto the store taxonomy.
    pub fn from_kube(err: kube::Error, target: impl Into<String>) -> Self {
        let target = target.into();
        match &err {
            kube::Error::Api(response) if response.code == 404 => StoreError::NotFound(target),
            kube::Error::Api(response)
                if response.code == 409 && response.reason == "AlreadyExists" =>
            {
                StoreError::AlreadyExists(target)
            }
            _ => StoreError::Other(format!("{target}: {err}")),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }
}

/// Failure to turn a live object into a replayable manifest
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SanitizeError {
    #[error("Failed to serialize object to {format}: {reason}")]
    Encode { format: &'static str, reason: String },

    #[error("Serialized object is not a mapping")]
    NotAMapping,

    #[error("Serialized manifest is empty")]
    Empty,
}

/// A stored manifest that cannot be decoded back into an object
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("Failed to decode manifest: {0}")]
    Decode(String),

    #[error("Manifest is missing required field '{0}'")]
    MissingField(&'static str),
}

/// Reasons a capture run produced no record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Sanitization failed: {0}")]
    Sanitize(#[from] SanitizeError),

    #[error("Failed to persist record: {0}")]
    Store(#[from] StoreError),
}

/// Prune failures that abort the whole operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PruneError {
    /// Usage error: no age, name or expiry selector was given
    #[error("At least one selector is required (older-than, name or expired)")]
    NoSelector,

    #[error("Failed to list TrashedResources: {0}")]
    List(StoreError),
}

/// Restore failures, all of which leave the record in place
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RestoreError {
    #[error("TrashedResource {namespace}/{name} not found")]
    NotFound { name: String, namespace: String },

    #[error("TrashedResource {namespace}/{name} holds a corrupt manifest: {source}")]
    CorruptManifest {
        name: String,
        namespace: String,
        #[source]
        source: ManifestError,
    },

    #[error("Resource {0} already exists")]
    AlreadyExists(ObjectRef),

    #[error("Failed to restore resource: {0}")]
    Store(StoreError),
}

/// Invalid operator configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_kube_error_mapping() {
        assert_eq!(
            StoreError::from_kube(api_error(404, "NotFound"), "ns1/a"),
            StoreError::NotFound("ns1/a".to_string())
        );
        assert_eq!(
            StoreError::from_kube(api_error(409, "AlreadyExists"), "ns1/a"),
            StoreError::AlreadyExists("ns1/a".to_string())
        );
        assert!(matches!(
            StoreError::from_kube(api_error(409, "Conflict"), "ns1/a"),
            StoreError::Other(_)
        ));
        assert!(matches!(
            StoreError::from_kube(api_error(500, "InternalError"), "ns1/a"),
            StoreError::Other(_)
        ));
    }

    #[test]
    fn test_restore_error_messages() {
        let err = RestoreError::NotFound {
            name: "trashed-delete-secret-a-1".to_string(),
            namespace: "ns1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "TrashedResource ns1/trashed-delete-secret-a-1 not found"
        );
    }
}
