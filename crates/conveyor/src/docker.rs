// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! [`ContainerRuntime`] backed by the Docker engine API.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::models::{ContainerInspectResponse, EventMessage};
use bollard::system::EventsOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::RuntimeError;
use crate::runtime::{
    ContainerEvent, ContainerInspection, ContainerRuntime, EventStream, Mount,
};

const DOCKER_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects through `DOCKER_HOST` or the platform default socket.
    pub fn connect_with_local_defaults() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults().map_err(RuntimeError::Connect)?;
        Ok(Self { docker })
    }

    pub fn connect_with_unix(socket: &str) -> Result<Self, RuntimeError> {
        let docker =
            Docker::connect_with_unix(socket, DOCKER_TIMEOUT_SECS, API_DEFAULT_VERSION)
                .map_err(RuntimeError::Connect)?;
        Ok(Self { docker })
    }

    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_running(&self) -> Result<Vec<String>, RuntimeError> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String>::default()))
            .await
            .map_err(RuntimeError::List)?;

        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerInspection, RuntimeError> {
        let response = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|source| RuntimeError::Inspect {
                id: id.to_string(),
                source,
            })?;
        Ok(to_inspection(id, response))
    }

    /// Opens the subscription right away on a background task, so events that happen before
    /// the returned stream is first polled are buffered rather than lost.
    fn events(&self) -> EventStream {
        let docker = self.docker.clone();
        let options = EventsOptions::<String> {
            filters: HashMap::from([("type".to_string(), vec!["container".to_string()])]),
            ..Default::default()
        };
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            debug!("Subscribing to docker container events");
            let mut events = Box::pin(docker.events(Some(options)));
            loop {
                let message = tokio::select! {
                    message = events.next() => message,
                    () = tx.closed() => break,
                };
                let item = match message {
                    Some(Ok(message)) => match to_event(message) {
                        Some(event) => Ok(event),
                        None => continue,
                    },
                    Some(Err(e)) => Err(RuntimeError::EventStream(e.to_string())),
                    None => break,
                };
                if tx.send(item).is_err() {
                    break;
                }
            }
            debug!("Docker event subscription closed");
        });

        Box::pin(async_stream::stream! {
            while let Some(item) = rx.recv().await {
                yield item;
            }
        })
    }
}

fn to_inspection(id: &str, response: ContainerInspectResponse) -> ContainerInspection {
    let (env, labels) = match response.config {
        Some(config) => (
            config.env.unwrap_or_default(),
            config.labels.unwrap_or_default(),
        ),
        None => (Vec::new(), HashMap::new()),
    };

    let mounts = response
        .mounts
        .unwrap_or_default()
        .into_iter()
        .filter_map(|mount| {
            Some(Mount {
                source: mount.source?,
                destination: mount.destination?,
            })
        })
        .collect();

    let name = response.name.unwrap_or_default();

    ContainerInspection {
        id: response.id.unwrap_or_else(|| id.to_string()),
        name: name.strip_prefix('/').unwrap_or(&name).to_string(),
        env,
        labels,
        log_path: response.log_path.unwrap_or_default(),
        mounts,
    }
}

fn to_event(message: EventMessage) -> Option<ContainerEvent> {
    let action = message.action?;
    let Some(id) = message.actor.and_then(|actor| actor.id) else {
        trace!("Ignoring container event {action} without actor");
        return None;
    };
    Some(ContainerEvent::new(action.as_str(), id))
}
