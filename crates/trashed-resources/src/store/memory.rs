/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! In-memory stores, used by tests and dry runs

use std::{
    collections::{BTreeMap, HashSet},
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use chrono::Utc;
use kube::api::DynamicObject;
use tokio::sync::RwLock;

use super::{NewRecord, ObjectRef, ObjectStore, RecordName, RetainedRecord, RetentionStore};
use crate::error::StoreError;

type RecordKey = (String, String);

/// Records kept in a map keyed by `(namespace, name)`
#[derive(Debug, Default)]
pub struct MemoryRetentionStore {
    records: RwLock<BTreeMap<RecordKey, RetainedRecord>>,
    failing_deletes: RwLock<HashSet<String>>,
    fail_list: RwLock<bool>,
    fail_create: RwLock<bool>,
    sequence: AtomicU64,
}

impl MemoryRetentionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record verbatim, keeping its creation timestamp
    pub async fn insert(&self, record: RetainedRecord) {
        self.records
            .write()
            .await
            .insert((record.namespace.clone(), record.name.clone()), record);
    }

    /// Make every delete of `name` fail
    pub async fn fail_deletes_of(&self, name: impl Into<String>) {
        self.failing_deletes.write().await.insert(name.into());
    }

    /// Make every list call fail
    pub async fn fail_lists(&self, fail: bool) {
        *self.fail_list.write().await = fail;
    }

    /// Make every create call fail
    pub async fn fail_creates(&self, fail: bool) {
        *self.fail_create.write().await = fail;
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn records(&self) -> Vec<RetainedRecord> {
        self.records.read().await.values().cloned().collect()
    }

    fn generated_name(&self, prefix: &str) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}{sequence:05x}")
    }
}

#[async_trait]
impl RetentionStore for MemoryRetentionStore {
    async fn get(&self, name: &str, namespace: &str) -> Result<RetainedRecord, StoreError> {
        self.records
            .read()
            .await
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("TrashedResource {namespace}/{name}")))
    }

    async fn list(
        &self,
        namespace: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<RetainedRecord>, StoreError> {
        if *self.fail_list.read().await {
            return Err(StoreError::Other("list unavailable".to_string()));
        }
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|record| namespace.map_or(true, |ns| ns.is_empty() || record.namespace == ns))
            .filter(|record| name.map_or(true, |name| record.name == name))
            .cloned()
            .collect())
    }

    async fn create(&self, record: NewRecord) -> Result<RetainedRecord, StoreError> {
        if *self.fail_create.read().await {
            return Err(StoreError::Other(format!(
                "TrashedResource {}/{}: create rejected",
                record.namespace,
                record.name.as_str()
            )));
        }
        let name = match &record.name {
            RecordName::Exact(name) => name.clone(),
            RecordName::Prefix(prefix) => self.generated_name(prefix),
        };
        let key = (record.namespace.clone(), name.clone());
        let mut records = self.records.write().await;
        if records.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!(
                "TrashedResource {}/{}",
                record.namespace, name
            )));
        }
        let stored = RetainedRecord {
            name,
            namespace: record.namespace,
            created_at: Some(Utc::now()),
            manifest: record.manifest,
            keep_until: record.keep_until,
        };
        records.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, name: &str, namespace: &str) -> Result<(), StoreError> {
        if self.failing_deletes.read().await.contains(name) {
            return Err(StoreError::Other(format!(
                "TrashedResource {namespace}/{name}: delete rejected"
            )));
        }
        self.records
            .write()
            .await
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("TrashedResource {namespace}/{name}")))
    }
}

/// Live objects keyed by their [`ObjectRef`]
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<ObjectRef, DynamicObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, object: DynamicObject) {
        self.objects
            .write()
            .await
            .insert(ObjectRef::from_object(&object), object);
    }

    pub async fn get(&self, reference: &ObjectRef) -> Option<DynamicObject> {
        self.objects.read().await.get(reference).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn create(&self, object: &DynamicObject) -> Result<ObjectRef, StoreError> {
        let reference = ObjectRef::from_object(object);
        let mut objects = self.objects.write().await;
        if objects.contains_key(&reference) {
            return Err(StoreError::AlreadyExists(reference.to_string()));
        }
        objects.insert(reference.clone(), object.clone());
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_record(name: RecordName, namespace: &str) -> NewRecord {
        NewRecord {
            name,
            namespace: namespace.to_string(),
            manifest: "kind: Secret\n".to_string(),
            keep_until: None,
        }
    }

    #[tokio::test]
    async fn test_exact_names_collide() {
        let store = MemoryRetentionStore::new();
        let record = new_record(RecordName::Exact("a".to_string()), "ns1");
        store.create(record.clone()).await.unwrap();
        assert!(store.create(record).await.unwrap_err().is_already_exists());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_prefixes_generate_unique_names() {
        let store = MemoryRetentionStore::new();
        let prefix = RecordName::Prefix("trashed-".to_string());
        let first = store.create(new_record(prefix.clone(), "ns1")).await.unwrap();
        let second = store.create(new_record(prefix, "ns1")).await.unwrap();
        assert_ne!(first.name, second.name);
        assert!(first.name.starts_with("trashed-"));
        assert!(first.created_at.is_some());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let store = MemoryRetentionStore::new();
        store.create(new_record(RecordName::Exact("a".to_string()), "ns1")).await.unwrap();
        store.create(new_record(RecordName::Exact("a".to_string()), "ns2")).await.unwrap();
        store.create(new_record(RecordName::Exact("b".to_string()), "ns1")).await.unwrap();

        assert_eq!(store.list(None, None).await.unwrap().len(), 3);
        assert_eq!(store.list(Some("ns1"), None).await.unwrap().len(), 2);
        assert_eq!(store.list(None, Some("a")).await.unwrap().len(), 2);
        assert_eq!(store.list(Some("ns2"), Some("b")).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_get_and_delete_missing() {
        let store = MemoryRetentionStore::new();
        assert!(store.get("a", "ns1").await.unwrap_err().is_not_found());
        assert!(store.delete("a", "ns1").await.unwrap_err().is_not_found());
    }
}
