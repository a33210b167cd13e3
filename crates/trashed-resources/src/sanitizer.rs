/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Conversion between live objects and replayable manifests
//!
//! [`sanitize`] turns a deleted object into the YAML document stored in a
//! record: type metadata is filled in when the object arrived without it and
//! `metadata.managedFields` is dropped. [`decode_manifest`] is the inverse
//! used when restoring.

use kube::api::DynamicObject;
use serde_json::{Map, Value};

use crate::{
    error::{ManifestError, SanitizeError},
    registry::{KindRegistry, WatchedKind},
};

const MANAGED_FIELDS: &str = "managedFields";

/// Serialize `object` into a sanitized YAML manifest.
///
/// `hint` is the kind the object was observed as; it is only consulted when
/// the object carries no type metadata of its own.
pub fn sanitize(
    object: &DynamicObject,
    registry: &KindRegistry,
    hint: Option<&WatchedKind>,
) -> Result<String, SanitizeError> {
    let mut tree = serde_json::to_value(object).map_err(|err| SanitizeError::Encode {
        format: "JSON",
        reason: err.to_string(),
    })?;
    let document = tree.as_object_mut().ok_or(SanitizeError::NotAMapping)?;

    let (kind, api_version) = type_identity(object, registry, hint);
    fill_if_missing(document, "kind", kind);
    fill_if_missing(document, "apiVersion", api_version);

    if let Some(Value::Object(metadata)) = document.get_mut("metadata") {
        metadata.remove(MANAGED_FIELDS);
    }

    let manifest = serde_yaml::to_string(&tree).map_err(|err| SanitizeError::Encode {
        format: "YAML",
        reason: err.to_string(),
    })?;
    if manifest.trim().is_empty() {
        return Err(SanitizeError::Empty);
    }
    Ok(manifest)
}

/// Kind and apiVersion for an object: its own type metadata first, then the
/// registry entry for its kind.
fn type_identity(
    object: &DynamicObject,
    registry: &KindRegistry,
    hint: Option<&WatchedKind>,
) -> (Option<String>, Option<String>) {
    let own = object.types.as_ref();
    let kind = own
        .map(|types| types.kind.as_str())
        .filter(|kind| !kind.is_empty())
        .or_else(|| hint.map(|hint| hint.kind()));

    let api_version = own
        .map(|types| types.api_version.clone())
        .filter(|api_version| !api_version.is_empty())
        .or_else(|| kind.and_then(|kind| registry.resolve(kind)).map(|kind| kind.api_version()));

    (kind.map(str::to_string), api_version)
}

fn fill_if_missing(document: &mut Map<String, Value>, key: &str, value: Option<String>) {
    let missing = match document.get(key) {
        None | Some(Value::Null) => true,
        Some(Value::String(current)) => current.is_empty(),
        Some(_) => false,
    };
    if missing {
        if let Some(value) = value {
            document.insert(key.to_string(), Value::String(value));
        }
    }
}

/// Decode a stored manifest (YAML or JSON) back into an object.
pub fn decode_manifest(manifest: &str) -> Result<DynamicObject, ManifestError> {
    let object: DynamicObject =
        serde_yaml::from_str(manifest).map_err(|err| ManifestError::Decode(err.to_string()))?;

    let types = object
        .types
        .as_ref()
        .ok_or(ManifestError::MissingField("kind"))?;
    if types.kind.is_empty() {
        return Err(ManifestError::MissingField("kind"));
    }
    if types.api_version.is_empty() {
        return Err(ManifestError::MissingField("apiVersion"));
    }
    if object.metadata.name.as_deref().map_or(true, str::is_empty) {
        return Err(ManifestError::MissingField("metadata.name"));
    }
    Ok(object)
}
