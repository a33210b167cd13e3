/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Capture of deleted objects into retained records

use std::sync::Arc;

use chrono::Utc;
use kube::api::DynamicObject;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info};

use crate::{
    error::{CaptureError, StoreError},
    metrics::TrashMetrics,
    registry::WatchedKind,
    sanitizer::sanitize,
    settings::LiveSettings,
    store::{NewRecord, RecordName, RetentionStore},
};

/// Action recorded in record names
const RECORD_ACTION: &str = "delete";
/// Longest name accepted for a custom resource
const MAX_NAME_LENGTH: usize = 253;
/// Hex characters of the identity hash appended to deterministic names
const SUFFIX_LENGTH: usize = 10;

/// How record names are derived
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingStrategy {
    /// Name plus a hash of the deletion's identity. A redelivered event maps
    /// to the same record, so it is never captured twice.
    #[default]
    Deterministic,
    /// Name prefix completed with a random suffix by the API server. Every
    /// delivery of an event creates a new record.
    Generated,
}

/// Why a deletion event was ignored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Neither the object nor the watch told us its kind
    NoKind,
    NoName,
}

/// Result of handling one deletion event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured(String),
    /// The deterministic record for this deletion already exists
    AlreadyCaptured(String),
    Skipped(SkipReason),
    Failed(CaptureError),
}

impl CaptureOutcome {
    pub fn record_name(&self) -> Option<&str> {
        match self {
            CaptureOutcome::Captured(name) | CaptureOutcome::AlreadyCaptured(name) => Some(name),
            _ => None,
        }
    }
}

/// `trashed-<action>-<kind>-<name>-`
pub fn record_name_prefix(kind: &str, name: &str) -> String {
    format!("trashed-{RECORD_ACTION}-{}-{}-", kind.to_lowercase(), name)
}

/// Stable hash of what identifies one deletion of one object
fn deletion_fingerprint(kind: &str, object: &DynamicObject) -> String {
    let metadata = &object.metadata;
    let deleted_at = metadata
        .deletion_timestamp
        .as_ref()
        .map(|time| time.0.to_rfc3339())
        .or_else(|| metadata.resource_version.clone())
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    for part in [
        kind,
        metadata.namespace.as_deref().unwrap_or_default(),
        metadata.name.as_deref().unwrap_or_default(),
        metadata.uid.as_deref().unwrap_or_default(),
        deleted_at.as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())[..SUFFIX_LENGTH].to_string()
}

fn deterministic_name(kind: &str, object: &DynamicObject) -> String {
    let mut prefix = record_name_prefix(kind, object.metadata.name.as_deref().unwrap_or_default());
    let max_prefix = MAX_NAME_LENGTH - SUFFIX_LENGTH;
    if prefix.len() > max_prefix {
        prefix.truncate(max_prefix);
    }
    prefix + &deletion_fingerprint(kind, object)
}

/// Turns deletion events into retained records
#[derive(Debug)]
pub struct CapturePipeline {
    store: Arc<dyn RetentionStore>,
    settings: Arc<LiveSettings>,
    metrics: Arc<TrashMetrics>,
    naming: NamingStrategy,
    fallback_namespace: String,
}

impl CapturePipeline {
    pub fn new(
        store: Arc<dyn RetentionStore>,
        settings: Arc<LiveSettings>,
        metrics: Arc<TrashMetrics>,
    ) -> Self {
        Self {
            store,
            settings,
            metrics,
            naming: NamingStrategy::default(),
            fallback_namespace: "system".to_string(),
        }
    }

    pub fn with_naming(mut self, naming: NamingStrategy) -> Self {
        self.naming = naming;
        self
    }

    /// Namespace holding records of cluster-scoped objects
    pub fn with_fallback_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.fallback_namespace = namespace.into();
        self
    }

    fn record_name(&self, kind: &str, object: &DynamicObject) -> RecordName {
        match self.naming {
            NamingStrategy::Deterministic => RecordName::Exact(deterministic_name(kind, object)),
            NamingStrategy::Generated => RecordName::Prefix(record_name_prefix(
                kind,
                object.metadata.name.as_deref().unwrap_or_default(),
            )),
        }
    }

    /// Capture one deleted object. `watched` is the kind the object was
    /// observed as, if known.
    pub async fn capture(
        &self,
        object: &DynamicObject,
        watched: Option<&WatchedKind>,
    ) -> CaptureOutcome {
        let kind = object
            .types
            .as_ref()
            .map(|types| types.kind.as_str())
            .filter(|kind| !kind.is_empty())
            .or_else(|| watched.map(|kind| kind.kind()));
        let Some(kind) = kind else {
            debug!(name = ?object.metadata.name, "Ignoring deletion of an object without kind");
            self.metrics.record_skip();
            return CaptureOutcome::Skipped(SkipReason::NoKind);
        };
        let Some(name) = object.metadata.name.as_deref().filter(|name| !name.is_empty()) else {
            debug!(kind, "Ignoring deletion of an object without name");
            self.metrics.record_skip();
            return CaptureOutcome::Skipped(SkipReason::NoName);
        };

        let manifest = match sanitize(object, self.settings.registry(), watched) {
            Ok(manifest) => manifest,
            Err(err) => {
                error!(kind, name, error = %err, "Unable to build manifest, deletion not captured");
                self.metrics.record_capture_failure(kind);
                return CaptureOutcome::Failed(err.into());
            }
        };

        let keep_until = self.settings.retention().await.keep_until(Utc::now());
        let namespace = object
            .metadata
            .namespace
            .clone()
            .filter(|namespace| !namespace.is_empty())
            .unwrap_or_else(|| self.fallback_namespace.clone());

        let record = NewRecord {
            name: self.record_name(kind, object),
            namespace,
            manifest,
            keep_until: Some(keep_until),
        };
        let requested = record.name.clone();
        let namespace = record.namespace.clone();

        match self.store.create(record).await {
            Ok(created) => {
                info!(
                    kind,
                    object = name,
                    record = %created.name,
                    namespace = %created.namespace,
                    keep_until = ?created.keep_until,
                    "Deleted object captured"
                );
                self.metrics.record_capture(kind);
                CaptureOutcome::Captured(created.name)
            }
            Err(StoreError::AlreadyExists(_)) if matches!(requested, RecordName::Exact(_)) => {
                info!(
                    kind,
                    object = name,
                    record = requested.as_str(),
                    namespace = %namespace,
                    "Deletion already captured"
                );
                CaptureOutcome::AlreadyCaptured(requested.as_str().to_string())
            }
            Err(err) => {
                error!(kind, object = name, namespace = %namespace, error = %err, "Error creating TrashedResource");
                self.metrics.record_capture_failure(kind);
                CaptureOutcome::Failed(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        registry::KindRegistry,
        error::CaptureError,
        retention::{parse_timestamp, HOURS_TO_KEEP_KEY, MINUTES_TO_KEEP_KEY},
        sanitizer::decode_manifest,
        settings::StaticConfigSource,
        store::MemoryRetentionStore,
    };
    use serde_json::json;

    struct Harness {
        store: Arc<MemoryRetentionStore>,
        source: Arc<StaticConfigSource>,
        settings: Arc<LiveSettings>,
        metrics: Arc<TrashMetrics>,
    }

    impl Harness {
        fn new() -> Self {
            let source = Arc::new(StaticConfigSource::new());
            Self {
                store: Arc::new(MemoryRetentionStore::new()),
                settings: Arc::new(LiveSettings::new(source.clone(), KindRegistry::new())),
                source,
                metrics: Arc::new(TrashMetrics::new().unwrap()),
            }
        }

        fn pipeline(&self, naming: NamingStrategy) -> CapturePipeline {
            CapturePipeline::new(self.store.clone(), self.settings.clone(), self.metrics.clone())
                .with_naming(naming)
                .with_fallback_namespace("trash")
        }
    }

    fn config_map(name: &str, namespace: &str) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": name,
                "namespace": namespace,
                "uid": "0b0f8a4e-7d55-4d2a-a1c4-3f2f5a1b9e01",
                "resourceVersion": "812",
                "managedFields": [{ "manager": "kubectl", "operation": "Update" }]
            },
            "data": { "key": "value" }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_capture_config_map_with_default_retention() {
        let harness = Harness::new();
        let pipeline = harness.pipeline(NamingStrategy::Deterministic);

        let before = Utc::now();
        let outcome = pipeline.capture(&config_map("app-cfg", "ns1"), None).await;
        let after = Utc::now();

        let name = outcome.record_name().unwrap().to_string();
        assert!(matches!(outcome, CaptureOutcome::Captured(_)));
        assert!(name.starts_with("trashed-delete-configmap-app-cfg-"));

        let record = harness.store.get(&name, "ns1").await.unwrap();
        let keep_until = parse_timestamp(record.keep_until.as_deref().unwrap()).unwrap();
        let hour = chrono::Duration::minutes(60);
        let tolerance = chrono::Duration::seconds(1);
        assert!(keep_until >= before + hour - tolerance);
        assert!(keep_until <= after + hour + tolerance);

        assert!(record.manifest.contains("kind: ConfigMap"));
        assert!(record.manifest.contains("apiVersion: v1"));
        assert!(!record.manifest.contains("managedFields"));
        assert_eq!(harness.metrics.captured("ConfigMap"), 1);
    }

    #[tokio::test]
    async fn test_capture_uses_current_retention() {
        let harness = Harness::new();
        harness.source.set(MINUTES_TO_KEEP_KEY, "5").await;
        harness.settings.refresh().await;
        let pipeline = harness.pipeline(NamingStrategy::Deterministic);

        let now = Utc::now();
        let outcome = pipeline.capture(&config_map("app-cfg", "ns1"), None).await;
        let record = harness
            .store
            .get(outcome.record_name().unwrap(), "ns1")
            .await
            .unwrap();
        let keep_until = parse_timestamp(record.keep_until.as_deref().unwrap()).unwrap();
        assert!(keep_until < now + chrono::Duration::minutes(6));
    }

    #[tokio::test]
    async fn test_oversized_retention_still_captures() {
        let harness = Harness::new();
        harness.source.set(HOURS_TO_KEEP_KEY, "3000000000").await;
        harness.settings.refresh().await;
        let pipeline = harness.pipeline(NamingStrategy::Deterministic);

        let now = Utc::now();
        let outcome = pipeline.capture(&config_map("app-cfg", "ns1"), None).await;
        assert!(matches!(outcome, CaptureOutcome::Captured(_)));

        let record = harness
            .store
            .get(outcome.record_name().unwrap(), "ns1")
            .await
            .unwrap();
        let keep_until = parse_timestamp(record.keep_until.as_deref().unwrap()).unwrap();
        assert!(keep_until < now + chrono::Duration::minutes(61));
    }

    #[tokio::test]
    async fn test_store_failure_is_reported_and_counted() {
        let harness = Harness::new();
        harness.store.fail_creates(true).await;
        let pipeline = harness.pipeline(NamingStrategy::Deterministic);

        let outcome = pipeline.capture(&config_map("app-cfg", "ns1"), None).await;
        assert!(matches!(
            outcome,
            CaptureOutcome::Failed(CaptureError::Store(StoreError::Other(_)))
        ));
        assert_eq!(outcome.record_name(), None);
        assert_eq!(harness.metrics.capture_failures("ConfigMap"), 1);
        assert_eq!(harness.metrics.captured("ConfigMap"), 0);
        assert!(harness.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_redelivered_event_is_captured_once() {
        let harness = Harness::new();
        let pipeline = harness.pipeline(NamingStrategy::Deterministic);
        let object = config_map("app-cfg", "ns1");

        let first = pipeline.capture(&object, None).await;
        let second = pipeline.capture(&object, None).await;
        assert!(matches!(first, CaptureOutcome::Captured(_)));
        assert!(matches!(second, CaptureOutcome::AlreadyCaptured(_)));
        assert_eq!(first.record_name(), second.record_name());
        assert_eq!(harness.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_generated_names_duplicate_redelivered_events() {
        // Random suffixes cannot tell a redelivery from a new deletion.
        let harness = Harness::new();
        let pipeline = harness.pipeline(NamingStrategy::Generated);
        let object = config_map("app-cfg", "ns1");

        pipeline.capture(&object, None).await;
        pipeline.capture(&object, None).await;
        assert_eq!(harness.store.len().await, 2);
    }

    #[tokio::test]
    async fn test_recreated_object_gets_new_record() {
        let harness = Harness::new();
        let pipeline = harness.pipeline(NamingStrategy::Deterministic);
        let first = config_map("app-cfg", "ns1");
        let mut second = first.clone();
        second.metadata.uid = Some("5e2b1c3d-0000-4000-8000-000000000002".to_string());

        pipeline.capture(&first, None).await;
        pipeline.capture(&second, None).await;
        assert_eq!(harness.store.len().await, 2);
    }

    #[tokio::test]
    async fn test_kind_comes_from_watch_when_missing() {
        let harness = Harness::new();
        let pipeline = harness.pipeline(NamingStrategy::Deterministic);
        let registry = KindRegistry::new();
        let deployment: DynamicObject = serde_json::from_value(json!({
            "metadata": { "name": "myapp", "namespace": "ns1" },
            "spec": { "replicas": 1 }
        }))
        .unwrap();

        let outcome = pipeline
            .capture(&deployment, registry.resolve("deployment").as_ref())
            .await;
        let record = harness
            .store
            .get(outcome.record_name().unwrap(), "ns1")
            .await
            .unwrap();
        let decoded = decode_manifest(&record.manifest).unwrap();
        let types = decoded.types.unwrap();
        assert_eq!(types.kind, "Deployment");
        assert_eq!(types.api_version, "apps/v1");
    }

    #[tokio::test]
    async fn test_kindless_and_nameless_events_are_skipped() {
        let harness = Harness::new();
        let pipeline = harness.pipeline(NamingStrategy::Deterministic);

        let kindless: DynamicObject =
            serde_json::from_value(json!({ "metadata": { "name": "x" } })).unwrap();
        assert_eq!(
            pipeline.capture(&kindless, None).await,
            CaptureOutcome::Skipped(SkipReason::NoKind)
        );

        let nameless: DynamicObject =
            serde_json::from_value(json!({ "apiVersion": "v1", "kind": "Secret", "metadata": {} }))
                .unwrap();
        assert_eq!(
            pipeline.capture(&nameless, None).await,
            CaptureOutcome::Skipped(SkipReason::NoName)
        );
        assert!(harness.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_cluster_scoped_objects_use_fallback_namespace() {
        let harness = Harness::new();
        let pipeline = harness.pipeline(NamingStrategy::Deterministic);
        let outcome = pipeline.capture(&config_map("global", ""), None).await;
        assert!(harness
            .store
            .get(outcome.record_name().unwrap(), "trash")
            .await
            .is_ok());
    }

    #[test]
    fn test_fingerprint_is_short_lowercase_hex() {
        let object = config_map("app-cfg", "ns1");
        let fingerprint = deletion_fingerprint("ConfigMap", &object);
        assert_eq!(fingerprint.len(), SUFFIX_LENGTH);
        assert!(fingerprint
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(fingerprint, deletion_fingerprint("ConfigMap", &object));
        assert_ne!(fingerprint, deletion_fingerprint("Secret", &object));
    }

    #[test]
    fn test_long_names_are_truncated() {
        let object = config_map(&"a".repeat(300), "ns1");
        let name = deterministic_name("ConfigMap", &object);
        assert_eq!(name.len(), MAX_NAME_LENGTH);
    }
}
