/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Restore of deleted objects from retained records
//!
//! Every failure before the live object is created leaves the record
//! untouched, so running the restore again is always safe. Once the live
//! object exists the record is deleted; a failure there is reported but does
//! not undo the restore.

use std::sync::Arc;

use kube::api::DynamicObject;
use tracing::{info, warn};

use crate::{
    error::{RestoreError, StoreError},
    metrics::TrashMetrics,
    sanitizer::decode_manifest,
    store::{ObjectRef, ObjectStore, RetentionStore},
};

/// How far a successful restore got
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStage {
    /// The live object exists, the record is still there
    Created,
    RecordDeleted,
}

/// Metadata handling when replaying a manifest.
///
/// `uid` and `resourceVersion` are always cleared. The other fields are kept
/// as stored unless the matching flag is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreFieldPolicy {
    pub strip_generation: bool,
    pub strip_creation_timestamp: bool,
    /// Owner references of a deleted owner make the garbage collector remove
    /// the restored object again.
    pub strip_owner_references: bool,
    pub strip_managed_fields: bool,
}

impl RestoreFieldPolicy {
    pub fn apply(&self, object: &mut DynamicObject) {
        let metadata = &mut object.metadata;
        metadata.uid = None;
        metadata.resource_version = None;
        if self.strip_generation {
            metadata.generation = None;
        }
        if self.strip_creation_timestamp {
            metadata.creation_timestamp = None;
        }
        if self.strip_owner_references {
            metadata.owner_references = None;
        }
        if self.strip_managed_fields {
            metadata.managed_fields = None;
        }
    }
}

/// Successful restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub record: String,
    pub namespace: String,
    pub restored: ObjectRef,
    pub stage: RestoreStage,
    /// Set when the record could not be deleted and needs manual cleanup
    pub stale_record: Option<StoreError>,
}

impl RestoreReport {
    pub fn is_clean(&self) -> bool {
        self.stale_record.is_none()
    }
}

/// Recreates live objects from retained records
#[derive(Debug)]
pub struct RestoreEngine {
    records: Arc<dyn RetentionStore>,
    objects: Arc<dyn ObjectStore>,
    metrics: Arc<TrashMetrics>,
    policy: RestoreFieldPolicy,
}

impl RestoreEngine {
    pub fn new(
        records: Arc<dyn RetentionStore>,
        objects: Arc<dyn ObjectStore>,
        metrics: Arc<TrashMetrics>,
    ) -> Self {
        Self {
            records,
            objects,
            metrics,
            policy: RestoreFieldPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RestoreFieldPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn restore(&self, name: &str, namespace: &str) -> Result<RestoreReport, RestoreError> {
        let result = self.try_restore(name, namespace).await;
        self.metrics.record_restore(match &result {
            Ok(report) if report.is_clean() => "success",
            Ok(_) => "stale_record",
            Err(RestoreError::NotFound { .. }) => "not_found",
            Err(RestoreError::CorruptManifest { .. }) => "corrupt_manifest",
            Err(RestoreError::AlreadyExists(_)) => "already_exists",
            Err(RestoreError::Store(_)) => "store_error",
        });
        result
    }

    async fn try_restore(&self, name: &str, namespace: &str) -> Result<RestoreReport, RestoreError> {
        let record = self
            .records
            .get(name, namespace)
            .await
            .map_err(|err| match err {
                StoreError::NotFound(_) => RestoreError::NotFound {
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                },
                other => RestoreError::Store(other),
            })?;
        info!(record = name, namespace, "Restoring resource from TrashedResource");

        let mut object =
            decode_manifest(&record.manifest).map_err(|source| RestoreError::CorruptManifest {
                name: name.to_string(),
                namespace: namespace.to_string(),
                source,
            })?;
        self.policy.apply(&mut object);
        if object.metadata.namespace.as_deref().map_or(true, str::is_empty) {
            object.metadata.namespace = Some(record.namespace.clone());
        }

        let restored = self.objects.create(&object).await.map_err(|err| match err {
            StoreError::AlreadyExists(_) => {
                RestoreError::AlreadyExists(ObjectRef::from_object(&object))
            }
            other => RestoreError::Store(other),
        })?;
        info!(resource = %restored, record = name, "Resource restored");

        let (stage, stale_record) = match self.records.delete(&record.name, &record.namespace).await {
            Ok(()) => (RestoreStage::RecordDeleted, None),
            Err(err) => {
                warn!(
                    record = name,
                    namespace,
                    error = %err,
                    "Resource restored but the TrashedResource could not be deleted, remove it manually"
                );
                (RestoreStage::Created, Some(err))
            }
        };

        Ok(RestoreReport {
            record: record.name,
            namespace: record.namespace,
            restored,
            stage,
            stale_record,
        })
    }
}
