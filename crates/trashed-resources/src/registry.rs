/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Static table of the resource kinds the trash bin knows how to watch.

use std::fmt;

use kube::core::{ApiResource, GroupVersionKind};

/// A resource kind resolved to its API group and version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchedKind {
    kind: &'static str,
    group: &'static str,
    version: &'static str,
}

const KNOWN_KINDS: &[WatchedKind] = &[
    WatchedKind::new("Deployment", "apps", "v1"),
    WatchedKind::new("Secret", "", "v1"),
    WatchedKind::new("ConfigMap", "", "v1"),
    WatchedKind::new("StatefulSet", "apps", "v1"),
    WatchedKind::new("DaemonSet", "apps", "v1"),
    WatchedKind::new("Ingress", "networking.k8s.io", "v1"),
    WatchedKind::new("CronJob", "batch", "v1"),
    WatchedKind::new("Job", "batch", "v1"),
    WatchedKind::new("Service", "", "v1"),
];

impl WatchedKind {
    const fn new(kind: &'static str, group: &'static str, version: &'static str) -> Self {
        Self {
            kind,
            group,
            version,
        }
    }

    /// Canonical kind name, e.g. `ConfigMap`
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// API group, empty for the core group
    pub fn group(&self) -> &'static str {
        self.group
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    /// `group/version`, or just `version` for the core group
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.to_string()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(self.group, self.version, self.kind)
    }

    /// Resource descriptor used to build dynamic APIs for this kind
    pub fn api_resource(&self) -> ApiResource {
        ApiResource::from_gvk(&self.gvk())
    }
}

impl fmt::Display for WatchedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.api_version())
    }
}

/// Outcome of resolving a configured list of kind names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindSelection {
    pub resolved: Vec<WatchedKind>,
    pub skipped: Vec<String>,
}

/// Case-insensitive lookup of kind names
#[derive(Debug, Clone, Copy)]
pub struct KindRegistry {
    entries: &'static [WatchedKind],
}

impl KindRegistry {
    pub fn new() -> Self {
        Self {
            entries: KNOWN_KINDS,
        }
    }

    /// Resolve a kind name. `None` means the kind is not mapped and must be
    /// skipped by the caller.
    pub fn resolve(&self, kind: &str) -> Option<WatchedKind> {
        let kind = kind.trim();
        self.entries
            .iter()
            .find(|entry| entry.kind.eq_ignore_ascii_case(kind))
            .copied()
    }

    /// Resolve every name in a configured list, collapsing duplicates.
    pub fn resolve_all<'x>(&self, names: impl IntoIterator<Item = &'x str>) -> KindSelection {
        let mut selection = KindSelection::default();
        for name in names {
            match self.resolve(name) {
                Some(kind) if !selection.resolved.contains(&kind) => selection.resolved.push(kind),
                Some(_) => {}
                None => selection.skipped.push(name.to_string()),
            }
        }
        selection
    }

    pub fn kinds(&self) -> impl Iterator<Item = &WatchedKind> {
        self.entries.iter()
    }
}

impl Default for KindRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a configured kind list. Entries are separated by `;` and any
/// surrounding or embedded whitespace is ignored.
pub fn parse_kind_list(raw: &str) -> Vec<&str> {
    raw.split(|c: char| c == ';' || c.is_whitespace())
        .filter(|name| !name.is_empty())
        .collect()
}
