// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Parser for the `CONVEYOR_*` directives declared in a container's environment.
//!
//! A container opts into log collection with `CONVEYOR_ENABLED=true`, picks the collector
//! instance that should own it with `CONVEYOR_NAME`, attaches extra fields with
//! `CONVEYOR_FIELD=k1:v1,k2:v2` and declares its log sources with
//! `CONVEYOR_PATH=stdout,/var/log/a.log;web:/var/log/web.log`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

pub const ENV_ENABLED: &str = "CONVEYOR_ENABLED";
pub const ENV_NAME: &str = "CONVEYOR_NAME";
pub const ENV_FIELD: &str = "CONVEYOR_FIELD";
pub const ENV_PATH: &str = "CONVEYOR_PATH";

/// Path token resolving to the container's console log.
pub const STDOUT: &str = "stdout";

const GROUP_SEPARATOR: char = ';';
const INDEX_SEPARATOR: char = ':';
const LIST_SEPARATOR: char = ',';

/// Key partitioning the paths of one container into independently labeled records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupIndex {
    /// Paths declared without an `index:` prefix.
    Default,
    Named(String),
}

/// Declared log paths keyed by group, in declaration order within a group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathGroups(BTreeMap<GroupIndex, Vec<String>>);

impl PathGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one `CONVEYOR_PATH` value and appends its groups.
    ///
    /// Groups are separated by `;`. A group is either `p1,p2` (default group) or `idx:p1,p2`.
    /// Groups with more than one `:` are ignored, as are empty paths. Appending to an index
    /// that already holds paths extends its list.
    pub fn extend_from_directive(&mut self, value: &str) {
        for group in value.split(GROUP_SEPARATOR) {
            let parts: Vec<&str> = group.split(INDEX_SEPARATOR).collect();
            let (index, paths) = match parts.as_slice() {
                [paths] => (GroupIndex::Default, *paths),
                [index, paths] => {
                    let index = index.trim();
                    if index.is_empty() {
                        continue;
                    }
                    (GroupIndex::Named(index.to_string()), *paths)
                }
                _ => continue,
            };

            let paths = paths
                .split(LIST_SEPARATOR)
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string);
            for path in paths {
                self.0.entry(index.clone()).or_default().push(path);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, index: &GroupIndex) -> Option<&[String]> {
        self.0.get(index).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupIndex, &[String])> {
        self.0.iter().map(|(idx, paths)| (idx, paths.as_slice()))
    }
}

impl fmt::Display for PathGroups {
    /// Writes the groups back in `CONVEYOR_PATH` syntax.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (index, paths)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{GROUP_SEPARATOR}")?;
            }
            if let GroupIndex::Named(name) = index {
                write!(f, "{name}{INDEX_SEPARATOR}")?;
            }
            write!(f, "{}", paths.join(","))?;
        }
        Ok(())
    }
}

/// Directives extracted from a container environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvInfo {
    /// Every variable that is not a field or path directive, including the enablement and
    /// owner-name flags.
    pub envs: BTreeMap<String, String>,
    /// Extra labels from `CONVEYOR_FIELD`.
    pub labels: HashMap<String, String>,
    pub paths: PathGroups,
}

/// Splits `KEY=VALUE` on the first `=`, trimming both sides. The value may be empty; entries
/// without a key or without `=` are rejected.
pub fn split_env(entry: &str) -> Option<(&str, &str)> {
    let (key, value) = entry.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim()))
}

/// Splits a `k:v` or `k=v` field pair. Both sides must be non-empty.
fn split_field(field: &str) -> Option<(&str, &str)> {
    let (key, value) = field.split_once(&[':', '='][..])?;
    let (key, value) = (key.trim(), value.trim());
    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some((key, value))
}

/// Decodes the raw `KEY=VALUE` environment of a container.
pub fn parse_env<S: AsRef<str>>(entries: &[S]) -> EnvInfo {
    let mut info = EnvInfo::default();

    for entry in entries {
        let Some((key, value)) = split_env(entry.as_ref()) else {
            continue;
        };
        match key {
            ENV_FIELD => {
                for field in value.split(LIST_SEPARATOR) {
                    if let Some((k, v)) = split_field(field) {
                        info.labels.insert(k.to_string(), v.to_string());
                    }
                }
            }
            ENV_PATH => info.paths.extend_from_directive(value),
            _ => {
                info.envs.insert(key.to_string(), value.to_string());
            }
        }
    }

    info
}
