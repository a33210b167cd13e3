/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Store implementations backed by the Kubernetes API

use async_trait::async_trait;
use kube::{
    api::{Api, DeleteParams, DynamicObject, ListParams, PostParams},
    core::GroupVersionKind,
    discovery::{self, Scope},
    Client,
};
use tracing::debug;

use super::{NewRecord, ObjectRef, ObjectStore, RetainedRecord, RetentionStore};
use crate::{crd::TrashedResource, error::StoreError};

/// `TrashedResource` custom resources
#[derive(Clone)]
pub struct KubeRetentionStore {
    client: Client,
}

impl KubeRetentionStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: Option<&str>) -> Api<TrashedResource> {
        match namespace.filter(|ns| !ns.is_empty()) {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }
}

impl std::fmt::Debug for KubeRetentionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeRetentionStore").finish_non_exhaustive()
    }
}

fn record_target(namespace: &str, name: &str) -> String {
    format!("TrashedResource {namespace}/{name}")
}

#[async_trait]
impl RetentionStore for KubeRetentionStore {
    async fn get(&self, name: &str, namespace: &str) -> Result<RetainedRecord, StoreError> {
        self.api(Some(namespace))
            .get(name)
            .await
            .map(RetainedRecord::from)
            .map_err(|err| StoreError::from_kube(err, record_target(namespace, name)))
    }

    async fn list(
        &self,
        namespace: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<RetainedRecord>, StoreError> {
        let mut params = ListParams::default();
        if let Some(name) = name {
            params = params.fields(&format!("metadata.name={name}"));
        }
        let list = self
            .api(namespace)
            .list(&params)
            .await
            .map_err(|err| StoreError::from_kube(err, "TrashedResources"))?;
        debug!(count = list.items.len(), ?namespace, ?name, "Listed TrashedResources");
        Ok(list.items.into_iter().map(RetainedRecord::from).collect())
    }

    async fn create(&self, record: NewRecord) -> Result<RetainedRecord, StoreError> {
        let target = record_target(&record.namespace, record.name.as_str());
        let namespace = record.namespace.clone();
        self.api(Some(&namespace))
            .create(&PostParams::default(), &TrashedResource::from(record))
            .await
            .map(RetainedRecord::from)
            .map_err(|err| StoreError::from_kube(err, target))
    }

    async fn delete(&self, name: &str, namespace: &str) -> Result<(), StoreError> {
        self.api(Some(namespace))
            .delete(name, &DeleteParams::background())
            .await
            .map(|_| ())
            .map_err(|err| StoreError::from_kube(err, record_target(namespace, name)))
    }
}

/// Live cluster objects of any kind, resolved through API discovery
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl KubeObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl std::fmt::Debug for KubeObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectStore").finish_non_exhaustive()
    }
}

/// Split `group/version` (or a bare core `version`) and attach the kind.
fn gvk_of(reference: &ObjectRef) -> Result<GroupVersionKind, StoreError> {
    if reference.kind.is_empty() || reference.api_version.is_empty() {
        return Err(StoreError::Other(format!(
            "object {} has no kind or apiVersion",
            reference.name
        )));
    }
    let (group, version) = reference
        .api_version
        .split_once('/')
        .unwrap_or(("", reference.api_version.as_str()));
    Ok(GroupVersionKind::gvk(group, version, &reference.kind))
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn create(&self, object: &DynamicObject) -> Result<ObjectRef, StoreError> {
        let mut reference = ObjectRef::from_object(object);
        let gvk = gvk_of(&reference)?;
        let (resource, capabilities) = discovery::pinned_kind(&self.client, &gvk)
            .await
            .map_err(|err| StoreError::from_kube(err, format!("API for {}", reference.kind)))?;

        let api: Api<DynamicObject> = match capabilities.scope {
            Scope::Namespaced => {
                let namespace = reference.namespace.clone().ok_or_else(|| {
                    StoreError::Other(format!("namespaced object {reference} has no namespace"))
                })?;
                Api::namespaced_with(self.client.clone(), &namespace, &resource)
            }
            Scope::Cluster => {
                reference.namespace = None;
                Api::all_with(self.client.clone(), &resource)
            }
        };

        let mut object = object.clone();
        object.metadata.namespace = reference.namespace.clone();
        api.create(&PostParams::default(), &object)
            .await
            .map_err(|err| StoreError::from_kube(err, reference.to_string()))?;
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(api_version: &str, kind: &str) -> ObjectRef {
        ObjectRef {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            namespace: None,
            name: "x".to_string(),
        }
    }

    #[test]
    fn test_gvk_parsing() {
        let gvk = gvk_of(&reference("apps/v1", "Deployment")).unwrap();
        assert_eq!((gvk.group.as_str(), gvk.version.as_str()), ("apps", "v1"));

        let gvk = gvk_of(&reference("v1", "ConfigMap")).unwrap();
        assert_eq!((gvk.group.as_str(), gvk.version.as_str()), ("", "v1"));

        assert!(gvk_of(&reference("", "ConfigMap")).is_err());
        assert!(gvk_of(&reference("v1", "")).is_err());
    }
}
