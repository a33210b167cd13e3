/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::sync::Arc;

use console::style;
use trashed_resources::{
    store::{KubeObjectStore, KubeRetentionStore, ObjectStore, RetentionStore},
    RestoreEngine, RestoreFieldPolicy, TrashMetrics,
};

use super::Session;

/// `restore <NAME>`
pub struct RestoreCommand {
    pub name: String,
    pub drop_owner_references: bool,
}

impl RestoreCommand {
    pub async fn exec(self, session: Session) -> anyhow::Result<()> {
        let records = Arc::new(KubeRetentionStore::new(session.client.clone()));
        let objects = Arc::new(KubeObjectStore::new(session.client));
        self.run(records, objects, &session.namespace).await
    }

    pub async fn run(
        self,
        records: Arc<dyn RetentionStore>,
        objects: Arc<dyn ObjectStore>,
        namespace: &str,
    ) -> anyhow::Result<()> {
        let policy = RestoreFieldPolicy {
            strip_owner_references: self.drop_owner_references,
            ..Default::default()
        };
        let engine = RestoreEngine::new(records, objects, Arc::new(TrashMetrics::new()?))
            .with_policy(policy);

        println!("Restoring resource from: {}", self.name);
        let report = engine.restore(&self.name, namespace).await?;
        println!(
            "{} Resource {} restored.",
            style("Success!").green().bold(),
            report.restored
        );

        if let Some(err) = report.stale_record {
            eprintln!(
                "{} failed to delete TrashedResource {}/{}: {}. You should manually delete it",
                style("Warning:").yellow().bold(),
                report.namespace,
                report.record,
                err
            );
        }
        Ok(())
    }
}
