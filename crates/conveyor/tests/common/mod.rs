// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Common test utilities and mocks for integration tests

pub mod mocks;

use std::collections::HashMap;
use std::time::Duration;

use conveyor::{ContainerInspection, Mount};

pub const CONTAINER_LOG: &str = "/var/lib/docker/containers/abc/abc-json.log";

#[allow(dead_code)]
pub fn inspection(id: &str, env: &[&str], mounts: &[(&str, &str)]) -> ContainerInspection {
    ContainerInspection {
        id: id.to_string(),
        name: format!("{id}-name"),
        env: env.iter().map(|e| e.to_string()).collect(),
        labels: HashMap::new(),
        log_path: CONTAINER_LOG.to_string(),
        mounts: mounts
            .iter()
            .map(|(source, destination)| Mount {
                source: source.to_string(),
                destination: destination.to_string(),
            })
            .collect(),
    }
}

/// Polls `condition` until it holds, panicking after five seconds.
#[allow(dead_code)]
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
