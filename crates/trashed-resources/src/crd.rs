//! Custom Resource Definitions

use kube::{api::ObjectMeta, CustomResource};
use serde::{Deserialize, Serialize};

use crate::store::{NewRecord, RecordName, RetainedRecord};

/// A deleted resource kept in the trash.
///
/// `data` holds the sanitized manifest and `keepUntil` the RFC3339 retention
/// deadline.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "mox.app.br",
    version = "v1alpha1",
    kind = "TrashedResource",
    plural = "trashedresources",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct TrashedResourceSpec {
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_until: Option<String>,
}

impl From<TrashedResource> for RetainedRecord {
    fn from(resource: TrashedResource) -> Self {
        Self {
            name: resource.metadata.name.unwrap_or_default(),
            namespace: resource.metadata.namespace.unwrap_or_default(),
            created_at: resource.metadata.creation_timestamp.map(|time| time.0),
            manifest: resource.spec.data,
            keep_until: resource.spec.keep_until.filter(|value| !value.is_empty()),
        }
    }
}

impl From<NewRecord> for TrashedResource {
    fn from(record: NewRecord) -> Self {
        let (name, generate_name) = match record.name {
            RecordName::Exact(name) => (Some(name), None),
            RecordName::Prefix(prefix) => (None, Some(prefix)),
        };
        TrashedResource {
            metadata: ObjectMeta {
                name,
                generate_name,
                namespace: Some(record.namespace),
                ..Default::default()
            },
            spec: TrashedResourceSpec {
                data: record.manifest,
                keep_until: record.keep_until,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn test_resource_identity() {
        assert_eq!(TrashedResource::group(&()), "mox.app.br");
        assert_eq!(TrashedResource::version(&()), "v1alpha1");
        assert_eq!(TrashedResource::kind(&()), "TrashedResource");
        assert_eq!(TrashedResource::plural(&()), "trashedresources");
    }

    #[test]
    fn test_spec_wire_format() {
        let resource = TrashedResource::from(NewRecord {
            name: RecordName::Prefix("trashed-delete-secret-creds-".to_string()),
            namespace: "ns1".to_string(),
            manifest: "kind: Secret\n".to_string(),
            keep_until: Some("2024-05-01T11:00:00Z".to_string()),
        });
        let json = serde_json::to_value(&resource).unwrap();
        assert_eq!(json["apiVersion"], "mox.app.br/v1alpha1");
        assert_eq!(json["kind"], "TrashedResource");
        assert_eq!(json["metadata"]["generateName"], "trashed-delete-secret-creds-");
        assert!(json["metadata"].get("name").is_none());
        assert_eq!(json["spec"]["data"], "kind: Secret\n");
        assert_eq!(json["spec"]["keepUntil"], "2024-05-01T11:00:00Z");
    }

    #[test]
    fn test_record_from_resource() {
        let resource: TrashedResource = serde_json::from_value(serde_json::json!({
            "apiVersion": "mox.app.br/v1alpha1",
            "kind": "TrashedResource",
            "metadata": {
                "name": "trashed-delete-configmap-app-cfg-abc12",
                "namespace": "ns1",
                "creationTimestamp": "2024-05-01T10:00:00Z"
            },
            "spec": { "data": "kind: ConfigMap\n", "keepUntil": "" }
        }))
        .unwrap();

        let record = RetainedRecord::from(resource);
        assert_eq!(record.name, "trashed-delete-configmap-app-cfg-abc12");
        assert_eq!(record.namespace, "ns1");
        assert!(record.created_at.is_some());
        assert_eq!(record.keep_until, None);
    }
}
