/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Runtime settings read from the cluster
//!
//! The watched kinds and the retention period live in a ConfigMap so that
//! operators can change them without restarting the controller. The
//! controller calls [`LiveSettings::refresh`] periodically; every capture
//! reads the retention in effect at that moment.

use std::{collections::BTreeMap, fmt, sync::Arc};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    error::StoreError,
    registry::{parse_kind_list, KindRegistry, WatchedKind},
    retention::{RetentionConfig, HOURS_TO_KEEP_KEY, MINUTES_TO_KEEP_KEY},
};

/// Configuration key holding the `;`-separated list of watched kinds
pub const KINDS_KEY: &str = "kindsTobserve";
/// Kinds watched when the configuration does not name any
pub const DEFAULT_KINDS: &str = "Deployment;Secret;ConfigMap";

/// Key/value view of the configuration source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    values: BTreeMap<String, String>,
}

impl ConfigSnapshot {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    /// Value of `key`, `None` when absent
    pub fn read_config(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConfigSnapshot {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Where the settings come from
#[async_trait]
pub trait ConfigSource: Send + Sync + fmt::Debug {
    /// Read the current configuration. A missing source yields an empty
    /// snapshot, not an error.
    async fn snapshot(&self) -> Result<ConfigSnapshot, StoreError>;
}

/// Settings ConfigMap in the cluster
#[derive(Clone)]
pub struct ConfigMapSource {
    api: Api<ConfigMap>,
    name: String,
    namespace: String,
}

impl ConfigMapSource {
    pub fn new(client: Client, namespace: &str, name: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }
}

impl fmt::Debug for ConfigMapSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigMapSource")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .finish()
    }
}

#[async_trait]
impl ConfigSource for ConfigMapSource {
    async fn snapshot(&self) -> Result<ConfigSnapshot, StoreError> {
        let config_map = self.api.get_opt(&self.name).await.map_err(|err| {
            StoreError::from_kube(err, format!("ConfigMap {}/{}", self.namespace, self.name))
        })?;
        Ok(ConfigSnapshot::new(
            config_map.and_then(|cm| cm.data).unwrap_or_default(),
        ))
    }
}

/// Fixed, mutable-in-place configuration source
#[derive(Debug, Default)]
pub struct StaticConfigSource {
    values: RwLock<BTreeMap<String, String>>,
}

impl StaticConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, key: &str, value: &str) {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn snapshot(&self) -> Result<ConfigSnapshot, StoreError> {
        Ok(ConfigSnapshot::new(self.values.read().await.clone()))
    }
}

/// Settings derived from one configuration snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub watched: Vec<WatchedKind>,
    /// Configured kind names the registry does not know
    pub skipped: Vec<String>,
    pub retention: RetentionConfig,
}

impl Settings {
    pub fn from_snapshot(snapshot: &ConfigSnapshot, registry: &KindRegistry) -> Self {
        let kinds = snapshot
            .read_config(KINDS_KEY)
            .filter(|raw| !raw.trim().is_empty())
            .unwrap_or(DEFAULT_KINDS);
        let selection = registry.resolve_all(parse_kind_list(kinds));
        Self {
            watched: selection.resolved,
            skipped: selection.skipped,
            retention: RetentionConfig::from_values(
                snapshot.read_config(MINUTES_TO_KEEP_KEY),
                snapshot.read_config(HOURS_TO_KEEP_KEY),
            ),
        }
    }
}

/// What changed in the last refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsChange {
    pub kinds_changed: bool,
    pub retention_changed: bool,
}

/// Process-wide settings, refreshed from a [`ConfigSource`]
#[derive(Debug)]
pub struct LiveSettings {
    source: Arc<dyn ConfigSource>,
    registry: KindRegistry,
    current: RwLock<Settings>,
    loaded: RwLock<bool>,
}

impl LiveSettings {
    /// Start from the defaults; call [`refresh`](Self::refresh) to load.
    pub fn new(source: Arc<dyn ConfigSource>, registry: KindRegistry) -> Self {
        let current = Settings::from_snapshot(&ConfigSnapshot::default(), &registry);
        Self {
            source,
            registry,
            current: RwLock::new(current),
            loaded: RwLock::new(false),
        }
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    /// Re-read the source. When it cannot be read the defaults are used on
    /// the first load and the previous settings are kept afterwards.
    pub async fn refresh(&self) -> SettingsChange {
        let next = match self.source.snapshot().await {
            Ok(snapshot) => Settings::from_snapshot(&snapshot, &self.registry),
            Err(err) => {
                let mut loaded = self.loaded.write().await;
                if *loaded {
                    warn!(error = %err, "Unable to read settings, keeping previous values");
                    return SettingsChange::default();
                }
                *loaded = true;
                warn!(error = %err, kinds = DEFAULT_KINDS, "Unable to read settings, using default values");
                return SettingsChange::default();
            }
        };
        *self.loaded.write().await = true;

        for kind in &next.skipped {
            info!(kind = %kind, "Kind not explicitly mapped; ignoring");
        }

        let mut current = self.current.write().await;
        let change = SettingsChange {
            kinds_changed: current.watched != next.watched,
            retention_changed: current.retention != next.retention,
        };
        if change.kinds_changed {
            let kinds: Vec<_> = next.watched.iter().map(|kind| kind.kind()).collect();
            info!(?kinds, "Watched kinds updated");
        }
        if change.retention_changed {
            info!(
                minutes_to_keep = next.retention.minutes_to_keep,
                hours_to_keep = next.retention.hours_to_keep,
                "Retention updated"
            );
        }
        *current = next;
        change
    }

    pub async fn current(&self) -> Settings {
        self.current.read().await.clone()
    }

    pub async fn retention(&self) -> RetentionConfig {
        self.current.read().await.retention
    }

    pub async fn watched_kinds(&self) -> Vec<WatchedKind> {
        self.current.read().await.watched.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct BrokenSource;

    #[async_trait]
    impl ConfigSource for BrokenSource {
        async fn snapshot(&self) -> Result<ConfigSnapshot, StoreError> {
            Err(StoreError::Other("forbidden".to_string()))
        }
    }

    fn kinds(settings: &Settings) -> Vec<&'static str> {
        settings.watched.iter().map(|kind| kind.kind()).collect()
    }

    #[test]
    fn test_defaults_when_keys_are_absent() {
        let settings = Settings::from_snapshot(&ConfigSnapshot::default(), &KindRegistry::new());
        assert_eq!(kinds(&settings), vec!["Deployment", "Secret", "ConfigMap"]);
        assert_eq!(settings.retention, RetentionConfig::default());
        assert!(settings.skipped.is_empty());
    }

    #[test]
    fn test_settings_from_snapshot() {
        let snapshot: ConfigSnapshot = [
            (KINDS_KEY, "statefulset; Ingress;Pod"),
            (MINUTES_TO_KEEP_KEY, "15"),
            (HOURS_TO_KEEP_KEY, "2"),
        ]
        .into_iter()
        .collect();
        let settings = Settings::from_snapshot(&snapshot, &KindRegistry::new());
        assert_eq!(kinds(&settings), vec!["StatefulSet", "Ingress"]);
        assert_eq!(settings.skipped, vec!["Pod".to_string()]);
        assert_eq!(settings.retention, RetentionConfig::new(15, 2));
    }

    #[test]
    fn test_unmapped_only_list_watches_nothing() {
        let snapshot: ConfigSnapshot = [(KINDS_KEY, "Pod;Node")].into_iter().collect();
        let settings = Settings::from_snapshot(&snapshot, &KindRegistry::new());
        assert!(settings.watched.is_empty());
        assert_eq!(settings.skipped.len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_reports_changes() {
        let source = Arc::new(StaticConfigSource::new());
        let settings = LiveSettings::new(source.clone(), KindRegistry::new());

        assert_eq!(settings.refresh().await, SettingsChange::default());

        source.set(MINUTES_TO_KEEP_KEY, "5").await;
        let change = settings.refresh().await;
        assert!(change.retention_changed);
        assert!(!change.kinds_changed);
        assert_eq!(settings.retention().await, RetentionConfig::new(5, 0));

        source.set(KINDS_KEY, "Job").await;
        let change = settings.refresh().await;
        assert!(change.kinds_changed);
        assert_eq!(settings.watched_kinds().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_source_keeps_defaults() {
        let settings = LiveSettings::new(Arc::new(BrokenSource), KindRegistry::new());
        assert_eq!(settings.refresh().await, SettingsChange::default());
        assert_eq!(settings.retention().await, RetentionConfig::default());
        assert_eq!(settings.watched_kinds().await.len(), 3);
    }
}
