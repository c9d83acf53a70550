// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Resolution of declared log sources into host-absolute paths.
//!
//! Every declared path is rewritten into a location reachable from the collector: `stdout`
//! becomes the runtime's own per-container log file, and in-container paths are mapped through
//! the bind mounts of the container. All results are rebased under the host-mount base, the
//! directory the host filesystem is mounted at inside the collector's own container.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::directive::{self, GroupIndex};
use crate::runtime::{ContainerInspection, Mount};

/// Label carrying the group index of a record.
pub const INDEX_LABEL: &str = "index";

/// Kubernetes labels injected by the kubelet, mapped to their output label.
pub static KUBERNETES_LABELS: [(&str, &str); 3] = [
    ("io.kubernetes.pod.namespace", "kubernetes_pod_namespace"),
    ("io.kubernetes.pod.name", "kubernetes_pod_name"),
    ("io.kubernetes.container.name", "kubernetes_container_name"),
];

const KUBERNETES_CONTAINER_NAME: &str = "kubernetes_container_name";

pub const DEFAULT_HOST_MOUNT: &str = "/host";

/// One log shipping record: a container and one of its path groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub log_path: Vec<String>,
}

impl ContainerInfo {
    /// Group index this record was produced for.
    pub fn index(&self) -> Option<&str> {
        self.labels.get(INDEX_LABEL).map(String::as_str)
    }

    /// First eight characters of the id, for logging.
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

pub(crate) fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[derive(Debug, Clone)]
pub struct Resolver {
    host_mount: String,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(DEFAULT_HOST_MOUNT)
    }
}

impl Resolver {
    pub fn new(host_mount: impl Into<String>) -> Self {
        Self {
            host_mount: host_mount.into(),
        }
    }

    pub fn host_mount(&self) -> &str {
        &self.host_mount
    }

    /// Produces one record per declared path group of the container.
    ///
    /// A container without any path group still yields a single record with no paths, so the
    /// caller always has the container environment to test ownership against. Paths are
    /// deduplicated across the whole container, not per group.
    pub fn resolve(&self, container: &ContainerInspection) -> Vec<ContainerInfo> {
        let env_info = directive::parse_env(&container.env);

        let mut labels: BTreeMap<String, String> = env_info.labels.into_iter().collect();
        labels.extend(kubernetes_labels(&container.labels));

        let default_index = labels
            .get(KUBERNETES_CONTAINER_NAME)
            .cloned()
            .unwrap_or_else(|| container.name.clone());

        let mut seen = HashSet::new();
        let mut infos = Vec::with_capacity(env_info.paths.len().max(1));

        for (index, paths) in env_info.paths.iter() {
            let mut group_labels = labels.clone();
            let index = match index {
                GroupIndex::Default => default_index.clone(),
                GroupIndex::Named(name) => name.clone(),
            };
            group_labels.insert(INDEX_LABEL.to_string(), index);

            let mut log_path = Vec::new();
            for path in paths {
                for resolved in self.resolve_path(container, path) {
                    if seen.insert(resolved.clone()) {
                        log_path.push(resolved);
                    }
                }
            }

            infos.push(ContainerInfo {
                id: container.id.clone(),
                name: container.name.clone(),
                env: env_info.envs.clone(),
                labels: group_labels,
                log_path,
            });
        }

        if infos.is_empty() {
            labels.insert(INDEX_LABEL.to_string(), default_index);
            infos.push(ContainerInfo {
                id: container.id.clone(),
                name: container.name.clone(),
                env: env_info.envs,
                labels,
                log_path: Vec::new(),
            });
        }

        infos
    }

    /// Candidate host locations of one declared path. A path under several overlapping mounts
    /// yields one candidate per mount.
    fn resolve_path(&self, container: &ContainerInspection, path: &str) -> Vec<String> {
        if path == directive::STDOUT {
            if container.log_path.is_empty() {
                return Vec::new();
            }
            return vec![join(&self.host_mount, &container.log_path)];
        }

        let base_dir = parent(path);
        container
            .mounts
            .iter()
            .filter_map(|mount| {
                let suffix = mount_suffix(mount, base_dir, path)?;
                Some(join(&self.host_mount, &format!("{}{}", mount.source, suffix)))
            })
            .collect()
    }
}

fn kubernetes_labels(
    raw: &HashMap<String, String>,
) -> impl Iterator<Item = (String, String)> + '_ {
    KUBERNETES_LABELS.iter().filter_map(move |(raw_key, label)| {
        raw.get(*raw_key)
            .map(|value| (label.to_string(), value.clone()))
    })
}

/// Part of `path` beyond the mount destination, when the mount covers the parent directory
/// of `path` on a separator boundary.
fn mount_suffix<'a>(mount: &Mount, base_dir: &str, path: &'a str) -> Option<&'a str> {
    let destination = mount.destination.trim_end_matches('/');
    if destination.is_empty() {
        // root mount
        return path.starts_with('/').then_some(path);
    }
    let rest = base_dir.strip_prefix(destination)?;
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }
    path.get(destination.len()..)
}

/// Parent directory of a slash separated path.
fn parent(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/",
        Some(i) => &trimmed[..i],
        None => ".",
    }
}

/// Joins two slash separated paths and lexically cleans the result.
pub(crate) fn join(base: &str, path: &str) -> String {
    clean(&format!("{base}/{path}"))
}

/// Lexical path cleaning: collapses duplicate separators and resolves `.` and `..`.
pub(crate) fn clean(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            _ => parts.push(part),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}
