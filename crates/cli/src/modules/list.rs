/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::sync::Arc;

use chrono::{DateTime, Utc};
use prettytable::{Attr, Cell, Row, Table};
use trashed_resources::{
    retention::time_remaining,
    store::{KubeRetentionStore, RetainedRecord, RetentionStore},
};

use super::{duration::format_duration, Session};

/// `list [-A]`
pub struct ListCommand {
    pub all_namespaces: bool,
}

impl ListCommand {
    pub async fn exec(self, session: Session) -> anyhow::Result<()> {
        let store = Arc::new(KubeRetentionStore::new(session.client));
        let rows = self.rows(store, &session.namespace, Utc::now()).await?;

        if rows.is_empty() {
            println!("No TrashedResources found.");
            return Ok(());
        }

        let mut table = Table::new();
        table.add_row(Row::new(
            ["NAMESPACE", "NAME", "CREATED", "KEEP UNTIL", "REMAINING"]
                .into_iter()
                .map(|title| Cell::new(title).with_style(Attr::Bold))
                .collect(),
        ));
        for row in &rows {
            table.add_row(Row::new(row.iter().map(|value| Cell::new(value)).collect()));
        }
        table.printstd();
        Ok(())
    }

    pub async fn rows(
        &self,
        store: Arc<dyn RetentionStore>,
        namespace: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<[String; 5]>> {
        let namespace = (!self.all_namespaces).then_some(namespace);
        let mut records = store.list(namespace, None).await?;
        records.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        Ok(records.iter().map(|record| row(record, now)).collect())
    }
}

fn row(record: &RetainedRecord, now: DateTime<Utc>) -> [String; 5] {
    let keep_until = record.keep_until.as_deref().filter(|value| !value.is_empty());
    let remaining = match keep_until.map(|deadline| time_remaining(deadline, now)) {
        None => "-".to_string(),
        Some(None) => "invalid".to_string(),
        Some(Some(left)) => match left.to_std() {
            Ok(left) if !left.is_zero() => format_duration(left),
            _ => "expired".to_string(),
        },
    };

    [
        record.namespace.clone(),
        record.name.clone(),
        record
            .created_at
            .map(|created| created.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string()),
        keep_until.unwrap_or("-").to_string(),
        remaining,
    ]
}
