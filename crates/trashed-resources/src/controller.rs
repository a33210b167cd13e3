/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Long-running capture controller
//!
//! One watcher task runs per watched kind and forwards every deletion event
//! to the [`CapturePipeline`]. Each watcher remembers the objects it has seen,
//! so deletions that happen while the watch is relisting are still captured
//! from their last known state. The settings ConfigMap is re-read on a fixed
//! interval; when the set of kinds changes, watchers are started and stopped
//! to match, and watchers whose task ended are started again. Expired records
//! are optionally swept on a second interval.

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::Arc,
    time::Duration,
};

use futures::StreamExt;
use kube::{api::DynamicObject, Api, Client};
use kube_runtime::{watcher, WatchStreamExt};
use tokio::{
    sync::RwLock,
    task::JoinHandle,
    time::{interval, Interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    capture::{CaptureOutcome, CapturePipeline},
    config::OperatorConfig,
    metrics::TrashMetrics,
    prune::{PruneEngine, PruneRequest},
    registry::{KindRegistry, WatchedKind},
    settings::{ConfigMapSource, LiveSettings},
    store::KubeRetentionStore,
    OperatorStatus, Result,
};

/// Watchers to start and stop to go from `running` to `desired`
#[derive(Debug, Default, PartialEq, Eq)]
pub struct WatcherPlan {
    pub start: Vec<WatchedKind>,
    pub stop: Vec<WatchedKind>,
}

impl WatcherPlan {
    pub fn between(running: &HashSet<WatchedKind>, desired: &[WatchedKind]) -> Self {
        let desired_set: HashSet<_> = desired.iter().copied().collect();
        let start = desired
            .iter()
            .copied()
            .filter(|kind| !running.contains(kind))
            .collect();
        let mut stop: Vec<_> = running
            .iter()
            .copied()
            .filter(|kind| !desired_set.contains(kind))
            .collect();
        stop.sort_by_key(|kind| kind.kind());
        Self { start, stop }
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_empty() && self.stop.is_empty()
    }
}

type ObjectKey = (Option<String>, String);

/// Last seen state of every live object of one watched kind
#[derive(Debug, Default)]
pub struct KnownObjects {
    objects: HashMap<ObjectKey, DynamicObject>,
}

impl KnownObjects {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(object: &DynamicObject) -> Option<ObjectKey> {
        let name = object.metadata.name.clone().filter(|name| !name.is_empty())?;
        let namespace = object.metadata.namespace.clone().filter(|ns| !ns.is_empty());
        Some((namespace, name))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Apply one watch event and return the objects it shows as deleted.
    ///
    /// A relist replaces the known set; every known object missing from it,
    /// or present again under a different uid, was deleted in between and is
    /// returned in its last seen state.
    pub fn apply(&mut self, event: watcher::Event<DynamicObject>) -> Vec<DynamicObject> {
        match event {
            watcher::Event::Applied(object) => {
                if let Some(key) = Self::key(&object) {
                    self.objects.insert(key, object);
                }
                Vec::new()
            }
            watcher::Event::Deleted(object) => {
                if let Some(key) = Self::key(&object) {
                    self.objects.remove(&key);
                }
                vec![object]
            }
            watcher::Event::Restarted(objects) => {
                let current: HashMap<_, _> = objects
                    .into_iter()
                    .filter_map(|object| Self::key(&object).map(|key| (key, object)))
                    .collect();
                let mut vanished: Vec<_> = self
                    .objects
                    .drain()
                    .filter(|(key, known)| {
                        current
                            .get(key)
                            .map_or(true, |now| now.metadata.uid != known.metadata.uid)
                    })
                    .collect();
                vanished.sort_by(|(a, _), (b, _)| a.cmp(b));
                self.objects = current;
                vanished.into_iter().map(|(_, object)| object).collect()
            }
        }
    }
}

/// Remove watchers whose task has ended and return their kinds
fn reap_finished(watchers: &mut HashMap<WatchedKind, JoinHandle<()>>) -> Vec<WatchedKind> {
    let mut finished: Vec<_> = watchers
        .iter()
        .filter(|(_, handle)| handle.is_finished())
        .map(|(kind, _)| *kind)
        .collect();
    finished.sort_by_key(|kind| kind.kind());
    for kind in &finished {
        watchers.remove(kind);
    }
    finished
}

/// The capture controller and everything it owns
pub struct TrashController {
    client: Client,
    config: OperatorConfig,
    settings: Arc<LiveSettings>,
    capture: Arc<CapturePipeline>,
    prune: PruneEngine,
    metrics: Arc<TrashMetrics>,
    status: Arc<RwLock<OperatorStatus>>,
}

impl TrashController {
    /// Build a controller on top of the in-cluster or kubeconfig client
    pub async fn connect(config: OperatorConfig) -> Result<Self> {
        let client = Client::try_default().await?;
        Self::new(client, config)
    }

    pub fn new(client: Client, config: OperatorConfig) -> Result<Self> {
        config.validate()?;
        let metrics = Arc::new(TrashMetrics::new()?);
        let settings = Arc::new(LiveSettings::new(
            Arc::new(ConfigMapSource::new(
                client.clone(),
                &config.config_map_namespace,
                &config.config_map_name,
            )),
            KindRegistry::new(),
        ));
        let store = Arc::new(KubeRetentionStore::new(client.clone()));
        let capture = Arc::new(
            CapturePipeline::new(store.clone(), settings.clone(), metrics.clone())
                .with_naming(config.naming)
                .with_fallback_namespace(config.fallback_namespace.clone()),
        );
        let prune = PruneEngine::new(store, metrics.clone());

        Ok(Self {
            client,
            config,
            settings,
            capture,
            prune,
            metrics,
            status: Arc::new(RwLock::new(OperatorStatus::Stopped)),
        })
    }

    pub fn metrics(&self) -> &TrashMetrics {
        &self.metrics
    }

    pub async fn status(&self) -> OperatorStatus {
        *self.status.read().await
    }

    async fn set_status(&self, status: OperatorStatus) {
        let mut current = self.status.write().await;
        if *current != status {
            info!("Operator status changed: {:?} -> {:?}", *current, status);
            *current = status;
        }
    }

    /// Run until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        self.set_status(OperatorStatus::Starting).await;
        self.settings.refresh().await;

        let mut watchers: HashMap<WatchedKind, JoinHandle<()>> = HashMap::new();
        self.sync_watchers(&mut watchers).await;

        let mut refresh = interval(Duration::from_secs(self.config.settings_refresh_secs));
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);
        refresh.tick().await;

        let mut sweep = (self.config.expiry_sweep_secs > 0).then(|| {
            let mut sweep = interval(Duration::from_secs(self.config.expiry_sweep_secs));
            sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
            sweep
        });

        self.set_status(OperatorStatus::Running).await;
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = refresh.tick() => {
                    let kinds_changed = self.settings.refresh().await.kinds_changed;
                    if kinds_changed || watchers.values().any(JoinHandle::is_finished) {
                        self.sync_watchers(&mut watchers).await;
                    }
                }
                _ = next_tick(&mut sweep) => self.sweep_expired().await,
            }
        }

        self.set_status(OperatorStatus::Stopping).await;
        for (kind, handle) in watchers.drain() {
            debug!(kind = %kind, "Stopping watcher");
            handle.abort();
        }
        self.set_status(OperatorStatus::Stopped).await;
        Ok(())
    }

    async fn sync_watchers(&self, watchers: &mut HashMap<WatchedKind, JoinHandle<()>>) {
        for kind in reap_finished(watchers) {
            warn!(kind = %kind, "Watcher ended unexpectedly");
        }
        let desired = self.settings.watched_kinds().await;
        let running: HashSet<_> = watchers.keys().copied().collect();
        let plan = WatcherPlan::between(&running, &desired);
        if desired.is_empty() {
            warn!("No watchable kinds configured, deletions are not captured");
        }

        for kind in plan.stop {
            if let Some(handle) = watchers.remove(&kind) {
                info!(kind = %kind, "Stopping watcher");
                handle.abort();
            }
        }
        for kind in plan.start {
            let handle = tokio::spawn(watch_deletions(
                self.client.clone(),
                kind,
                self.capture.clone(),
            ));
            watchers.insert(kind, handle);
        }
    }

    async fn sweep_expired(&self) {
        match self.prune.prune(&PruneRequest::expired_everywhere()).await {
            Ok(report) if report.deleted_count() > 0 || !report.failed.is_empty() => info!(
                deleted = report.deleted_count(),
                failed = report.failed.len(),
                "Expired TrashedResources swept"
            ),
            Ok(_) => debug!("No expired TrashedResources"),
            Err(err) => warn!(error = %err, "Expired sweep failed"),
        }
    }
}

impl std::fmt::Debug for TrashController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrashController")
            .field("config", &self.config)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn watch_deletions(client: Client, kind: WatchedKind, capture: Arc<CapturePipeline>) {
    let api: Api<DynamicObject> = Api::all_with(client, &kind.api_resource());
    let mut events = watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed();
    info!(kind = %kind, "Watching deletions");

    let mut known = KnownObjects::new();
    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                warn!(kind = %kind, error = %err, "Watch error, retrying");
                continue;
            }
        };
        let relisted = matches!(event, watcher::Event::Restarted(_));
        let deleted = known.apply(event);
        if relisted {
            debug!(kind = %kind, known = known.len(), vanished = deleted.len(), "Watch relisted");
        }
        for object in deleted {
            if let CaptureOutcome::Captured(record) = capture.capture(&object, Some(&kind)).await {
                debug!(kind = %kind, record = %record, "Capture complete");
            }
        }
    }
    error!(kind = %kind, "Watch stream ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn secret(name: &str, uid: &str) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": { "name": name, "namespace": "ns1", "uid": uid }
        }))
        .unwrap()
    }

    fn names(objects: &[DynamicObject]) -> Vec<&str> {
        objects
            .iter()
            .filter_map(|object| object.metadata.name.as_deref())
            .collect()
    }

    fn kinds(names: &str) -> Vec<WatchedKind> {
        KindRegistry::new()
            .resolve_all(names.split(';'))
            .resolved
    }

    #[test]
    fn test_plan_from_nothing_starts_everything() {
        let plan = WatcherPlan::between(&HashSet::new(), &kinds("Deployment;Secret"));
        assert_eq!(plan.start, kinds("Deployment;Secret"));
        assert!(plan.stop.is_empty());
    }

    #[test]
    fn test_plan_only_touches_changed_kinds() {
        let running: HashSet<_> = kinds("Deployment;Secret;ConfigMap").into_iter().collect();
        let plan = WatcherPlan::between(&running, &kinds("Secret;ConfigMap;Job"));
        assert_eq!(plan.start, kinds("Job"));
        assert_eq!(plan.stop, kinds("Deployment"));
    }

    #[test]
    fn test_plan_is_empty_when_unchanged() {
        let running: HashSet<_> = kinds("Secret;ConfigMap").into_iter().collect();
        assert!(WatcherPlan::between(&running, &kinds("ConfigMap;Secret")).is_empty());
    }

    #[test]
    fn test_deleted_events_are_reported() {
        let mut known = KnownObjects::new();
        assert!(known.apply(watcher::Event::Applied(secret("a", "1"))).is_empty());
        assert_eq!(known.len(), 1);

        let deleted = known.apply(watcher::Event::Deleted(secret("a", "1")));
        assert_eq!(names(&deleted), ["a"]);
        assert!(known.is_empty());

        // Deletions of objects never seen are still reported.
        let deleted = known.apply(watcher::Event::Deleted(secret("b", "2")));
        assert_eq!(names(&deleted), ["b"]);
    }

    #[test]
    fn test_relist_reports_objects_deleted_in_between() {
        let mut known = KnownObjects::new();
        known.apply(watcher::Event::Restarted(vec![
            secret("x", "1"),
            secret("y", "2"),
            secret("z", "3"),
        ]));
        let mut updated = secret("y", "2");
        updated.data = json!({ "data": { "token": "bmV3" } });
        known.apply(watcher::Event::Applied(updated));

        let vanished = known.apply(watcher::Event::Restarted(vec![
            secret("y", "2"),
            secret("z", "4"),
        ]));
        assert_eq!(names(&vanished), ["x", "z"]);
        assert_eq!(vanished[1].metadata.uid.as_deref(), Some("3"));
        assert_eq!(known.len(), 2);

        assert!(known
            .apply(watcher::Event::Restarted(vec![secret("y", "2"), secret("z", "4")]))
            .is_empty());
    }

    #[test]
    fn test_first_list_reports_nothing() {
        let mut known = KnownObjects::new();
        let vanished = known.apply(watcher::Event::Restarted(vec![secret("x", "1")]));
        assert!(vanished.is_empty());
        assert_eq!(known.len(), 1);
    }

    #[tokio::test]
    async fn test_finished_watchers_are_reaped() {
        let secret_kind = kinds("Secret")[0];
        let config_map_kind = kinds("ConfigMap")[0];
        let ended = tokio::spawn(async {});
        let running = tokio::spawn(std::future::pending::<()>());
        while !ended.is_finished() {
            tokio::task::yield_now().await;
        }

        let mut watchers = HashMap::new();
        watchers.insert(secret_kind, ended);
        watchers.insert(config_map_kind, running);

        assert_eq!(reap_finished(&mut watchers), vec![secret_kind]);
        assert_eq!(watchers.len(), 1);
        assert!(watchers.contains_key(&config_map_kind));

        let plan = WatcherPlan::between(
            &watchers.keys().copied().collect(),
            &kinds("ConfigMap;Secret"),
        );
        assert_eq!(plan.start, vec![secret_kind]);
        for handle in watchers.into_values() {
            handle.abort();
        }
    }

    #[test]
    fn test_plan_stops_everything_for_empty_selection() {
        let running: HashSet<_> = kinds("Secret;ConfigMap").into_iter().collect();
        let plan = WatcherPlan::between(&running, &[]);
        assert_eq!(plan.stop, kinds("ConfigMap;Secret"));
    }
}
