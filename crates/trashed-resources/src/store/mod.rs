/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Storage abstractions for retained records and live objects

pub mod cluster;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kube::api::DynamicObject;

use crate::error::StoreError;

pub use cluster::{KubeObjectStore, KubeRetentionStore};
pub use memory::{MemoryObjectStore, MemoryRetentionStore};

/// A captured deletion, as stored in the trash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetainedRecord {
    pub name: String,
    pub namespace: String,
    /// Set by the store when the record is created
    pub created_at: Option<DateTime<Utc>>,
    /// Sanitized YAML manifest of the deleted object
    pub manifest: String,
    /// RFC3339 retention deadline
    pub keep_until: Option<String>,
}

/// How the name of a new record is chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordName {
    /// Use this exact name; creating it twice fails with `AlreadyExists`
    Exact(String),
    /// Let the store append a random suffix to this prefix
    Prefix(String),
}

impl RecordName {
    pub fn as_str(&self) -> &str {
        match self {
            RecordName::Exact(name) | RecordName::Prefix(name) => name,
        }
    }
}

/// Record to be created by [`RetentionStore::create`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub name: RecordName,
    pub namespace: String,
    pub manifest: String,
    pub keep_until: Option<String>,
}

/// Persistence of retained records
#[async_trait]
pub trait RetentionStore: Send + Sync + fmt::Debug {
    /// Fetch a single record
    async fn get(&self, name: &str, namespace: &str) -> Result<RetainedRecord, StoreError>;

    /// List records, optionally restricted to a namespace and an exact name
    async fn list(
        &self,
        namespace: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<RetainedRecord>, StoreError>;

    /// Create a record and return it as stored
    async fn create(&self, record: NewRecord) -> Result<RetainedRecord, StoreError>;

    /// Delete a record
    async fn delete(&self, name: &str, namespace: &str) -> Result<(), StoreError>;
}

/// Identity of a live object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectRef {
    pub fn from_object(object: &DynamicObject) -> Self {
        let (api_version, kind) = object
            .types
            .as_ref()
            .map(|types| (types.api_version.clone(), types.kind.clone()))
            .unwrap_or_default();
        Self {
            api_version,
            kind,
            namespace: object.metadata.namespace.clone().filter(|ns| !ns.is_empty()),
            name: object.metadata.name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{} {}/{}", self.kind, namespace, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// The cluster's live objects, as far as restore needs them
#[async_trait]
pub trait ObjectStore: Send + Sync + fmt::Debug {
    /// Create a live object. An existing object with the same identity yields
    /// `StoreError::AlreadyExists` and is left untouched.
    async fn create(&self, object: &DynamicObject) -> Result<ObjectRef, StoreError>;
}
