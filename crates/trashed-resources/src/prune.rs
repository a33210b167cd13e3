/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Bulk deletion of retained records by age, name or expired deadline

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::{
    error::{PruneError, StoreError},
    metrics::TrashMetrics,
    retention::now_is_after_or_equal,
    store::{RetainedRecord, RetentionStore},
};

/// Which records to prune
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneRequest {
    /// Restrict to one namespace; `None` covers all namespaces
    pub namespace: Option<String>,
    /// Only records created longer ago than this
    pub older_than: Option<Duration>,
    /// Only the record with exactly this name
    pub name: Option<String>,
    /// Only records whose retention deadline has passed
    pub expired: bool,
    /// Report the selection without deleting anything
    pub dry_run: bool,
}

impl PruneRequest {
    pub fn has_selector(&self) -> bool {
        self.older_than.is_some() || self.name.is_some() || self.expired
    }

    /// Records past their deadline in every namespace
    pub fn expired_everywhere() -> Self {
        Self {
            expired: true,
            ..Default::default()
        }
    }
}

/// A selected record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunedRecord {
    pub name: String,
    pub namespace: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&RetainedRecord> for PrunedRecord {
    fn from(record: &RetainedRecord) -> Self {
        Self {
            name: record.name.clone(),
            namespace: record.namespace.clone(),
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneFailure {
    pub record: PrunedRecord,
    pub error: StoreError,
}

/// Outcome of one prune run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Candidates returned by the store
    pub listed: usize,
    /// Candidates matching every selector
    pub selected: Vec<PrunedRecord>,
    pub deleted: Vec<PrunedRecord>,
    pub failed: Vec<PruneFailure>,
    pub dry_run: bool,
}

impl PruneReport {
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }
}

/// Whether `record` matches every selector of `request` at `now`
pub fn is_eligible(record: &RetainedRecord, request: &PruneRequest, now: DateTime<Utc>) -> bool {
    if let Some(name) = &request.name {
        if record.name != *name {
            return false;
        }
    }

    if let Some(older_than) = request.older_than {
        let cutoff = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| now.checked_sub_signed(age));
        match (cutoff, record.created_at) {
            (Some(cutoff), Some(created_at)) if created_at < cutoff => {}
            _ => return false,
        }
    }

    if request.expired {
        match record.keep_until.as_deref().filter(|value| !value.is_empty()) {
            None => {}
            Some(keep_until) => match now_is_after_or_equal(keep_until, now) {
                Some(true) => {}
                Some(false) => return false,
                None => {
                    warn!(
                        record = %record.name,
                        namespace = %record.namespace,
                        keep_until,
                        "Unparseable keepUntil, record is not considered expired"
                    );
                    return false;
                }
            },
        }
    }

    true
}

/// Deletes records selected by a [`PruneRequest`]
#[derive(Debug)]
pub struct PruneEngine {
    store: Arc<dyn RetentionStore>,
    metrics: Arc<TrashMetrics>,
}

impl PruneEngine {
    pub fn new(store: Arc<dyn RetentionStore>, metrics: Arc<TrashMetrics>) -> Self {
        Self { store, metrics }
    }

    /// Prune at the current time
    pub async fn prune(&self, request: &PruneRequest) -> Result<PruneReport, PruneError> {
        self.prune_at(request, Utc::now()).await
    }

    /// Prune as if the current time were `now`.
    ///
    /// Only a failure to list candidates fails the call; individual delete
    /// failures are collected in the report.
    pub async fn prune_at(
        &self,
        request: &PruneRequest,
        now: DateTime<Utc>,
    ) -> Result<PruneReport, PruneError> {
        if !request.has_selector() {
            return Err(PruneError::NoSelector);
        }

        let candidates = self
            .store
            .list(request.namespace.as_deref(), request.name.as_deref())
            .await
            .map_err(PruneError::List)?;

        let mut report = PruneReport {
            listed: candidates.len(),
            dry_run: request.dry_run,
            ..Default::default()
        };
        debug!(
            listed = report.listed,
            namespace = ?request.namespace,
            name = ?request.name,
            older_than = ?request.older_than,
            expired = request.expired,
            "Selecting TrashedResources to prune"
        );

        for record in candidates.iter().filter(|record| is_eligible(record, request, now)) {
            let selected = PrunedRecord::from(record);
            report.selected.push(selected.clone());
            if request.dry_run {
                continue;
            }

            match self.store.delete(&record.name, &record.namespace).await {
                Ok(()) => {
                    info!(
                        record = %record.name,
                        namespace = %record.namespace,
                        created_at = ?record.created_at,
                        "TrashedResource pruned"
                    );
                    report.deleted.push(selected);
                }
                Err(err) => {
                    error!(
                        record = %record.name,
                        namespace = %record.namespace,
                        error = %err,
                        "Error deleting TrashedResource"
                    );
                    report.failed.push(PruneFailure {
                        record: selected,
                        error: err,
                    });
                }
            }
        }

        self.metrics
            .record_prune(report.deleted.len(), report.failed.len());
        Ok(report)
    }
}
