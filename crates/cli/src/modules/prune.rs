/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use console::style;
use trashed_resources::{
    prune::PrunedRecord,
    store::{KubeRetentionStore, RetentionStore},
    PruneEngine, PruneReport, PruneRequest, TrashMetrics,
};

use super::{duration::format_duration, Session};

const DATE_TIME: &str = "%Y-%m-%d %H:%M:%S";

/// `prune [--older-than D] [--name N] [--expired] [-A] [--dry-run]`
pub struct PruneCommand {
    pub older_than: Option<Duration>,
    pub name: Option<String>,
    pub expired: bool,
    pub all_namespaces: bool,
    pub dry_run: bool,
}

impl PruneCommand {
    pub async fn exec(self, session: Session) -> anyhow::Result<()> {
        let store = Arc::new(KubeRetentionStore::new(session.client));
        let report = self.run(store, &session.namespace, Utc::now()).await?;
        print_report(&report);
        Ok(())
    }

    fn request(&self, namespace: &str) -> PruneRequest {
        PruneRequest {
            namespace: (!self.all_namespaces).then(|| namespace.to_string()),
            older_than: self.older_than,
            name: self.name.clone(),
            expired: self.expired,
            dry_run: self.dry_run,
        }
    }

    pub async fn run(
        &self,
        store: Arc<dyn RetentionStore>,
        namespace: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<PruneReport> {
        let request = self.request(namespace);
        let engine = PruneEngine::new(store, Arc::new(TrashMetrics::new()?));

        if let Some(older_than) = request.older_than.filter(|age| !age.is_zero()) {
            let cutoff = chrono::Duration::from_std(older_than)
                .ok()
                .and_then(|age| now.checked_sub_signed(age))
                .unwrap_or(now);
            println!(
                "Searching for TrashedResources created before {} (older-than {})",
                cutoff.format(DATE_TIME),
                format_duration(older_than)
            );
        }
        if let Some(name) = &request.name {
            println!("Searching for TrashedResources named as {name}");
        }
        if request.expired {
            println!("Searching for TrashedResources past their keepUntil");
        }

        Ok(engine.prune_at(&request, now).await?)
    }
}

fn created_at(record: &PrunedRecord) -> String {
    record
        .created_at
        .map(|created| created.format(DATE_TIME).to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn print_report(report: &PruneReport) {
    if report.dry_run {
        for record in &report.selected {
            println!(
                "Would delete {}/{} (Created at: {})",
                record.namespace,
                record.name,
                created_at(record)
            );
        }
        println!("Total to delete: {}", report.selected.len());
        return;
    }

    for record in &report.deleted {
        println!(
            "Deleting {}/{} (Created at: {})",
            record.namespace,
            record.name,
            created_at(record)
        );
    }
    for failure in &report.failed {
        eprintln!(
            "{} deleting {}: {}",
            style("ERROR").red().bold(),
            failure.record.name,
            failure.error
        );
    }
    println!("Total deleted: {}", report.deleted_count());
}
