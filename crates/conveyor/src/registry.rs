// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Owner of the container set shipped by the agent.
//!
//! A single [`RegistryService`] task holds the set and handles one command at a time: the
//! mutation and the configuration rewrite that follows it complete before the next command is
//! read, so the file on disk always reflects the latest set.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::error::PorterError;
use crate::resolver::ContainerInfo;

/// Persists the agent configuration for a container set.
#[async_trait]
pub trait ConfigWriter: Send + Sync {
    async fn write(&self, containers: &[ContainerInfo]) -> Result<(), PorterError>;
}

type Reply = oneshot::Sender<Result<(), PorterError>>;

#[derive(Debug)]
pub enum RegistryCommand {
    Replace(Vec<ContainerInfo>, Reply),
    Add(ContainerInfo, Reply),
    Remove(String, Reply),
    Snapshot(oneshot::Sender<Vec<ContainerInfo>>),
    Shutdown,
}

#[derive(Clone, Debug)]
pub struct RegistryHandle {
    tx: mpsc::UnboundedSender<RegistryCommand>,
}

impl RegistryHandle {
    pub async fn replace(&self, containers: Vec<ContainerInfo>) -> Result<(), PorterError> {
        self.request(|reply| RegistryCommand::Replace(containers, reply))
            .await
    }

    pub async fn add(&self, container: ContainerInfo) -> Result<(), PorterError> {
        self.request(|reply| RegistryCommand::Add(container, reply))
            .await
    }

    pub async fn remove(&self, id: &str) -> Result<(), PorterError> {
        let id = id.to_string();
        self.request(|reply| RegistryCommand::Remove(id, reply))
            .await
    }

    pub async fn snapshot(&self) -> Result<Vec<ContainerInfo>, PorterError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(RegistryCommand::Snapshot(response_tx))
            .map_err(|_| PorterError::RegistryClosed)?;
        response_rx.await.map_err(|_| PorterError::RegistryClosed)
    }

    pub fn shutdown(&self) -> Result<(), PorterError> {
        self.tx
            .send(RegistryCommand::Shutdown)
            .map_err(|_| PorterError::RegistryClosed)
    }

    async fn request(
        &self,
        command: impl FnOnce(Reply) -> RegistryCommand,
    ) -> Result<(), PorterError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(command(response_tx))
            .map_err(|_| PorterError::RegistryClosed)?;
        response_rx.await.map_err(|_| PorterError::RegistryClosed)?
    }
}

pub struct RegistryService {
    containers: Vec<ContainerInfo>,
    writer: Box<dyn ConfigWriter>,
    rx: mpsc::UnboundedReceiver<RegistryCommand>,
}

impl RegistryService {
    pub fn new(writer: Box<dyn ConfigWriter>) -> (Self, RegistryHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = Self {
            containers: Vec::new(),
            writer,
            rx,
        };
        (service, RegistryHandle { tx })
    }

    pub async fn run(mut self) {
        debug!("Container registry started");

        while let Some(command) = self.rx.recv().await {
            match command {
                RegistryCommand::Replace(containers, reply) => {
                    self.containers = containers;
                    self.reply(reply).await;
                }
                RegistryCommand::Add(container, reply) => {
                    self.add(container);
                    self.reply(reply).await;
                }
                RegistryCommand::Remove(id, reply) => {
                    self.containers.retain(|c| c.id != id);
                    self.reply(reply).await;
                }
                RegistryCommand::Snapshot(response_tx) => {
                    if response_tx.send(self.containers.clone()).is_err() {
                        error!("Failed to send registry snapshot - receiver dropped");
                    }
                }
                RegistryCommand::Shutdown => {
                    debug!("Container registry shutting down");
                    break;
                }
            }
        }

        debug!("Container registry stopped");
    }

    /// Replaces a record of the same container and group in place, appends otherwise.
    fn add(&mut self, container: ContainerInfo) {
        let existing = self
            .containers
            .iter_mut()
            .find(|c| c.id == container.id && c.index() == container.index());
        match existing {
            Some(slot) => {
                debug!(
                    "Replacing existing record of container {} group {:?}",
                    container.short_id(),
                    container.index()
                );
                *slot = container;
            }
            None => self.containers.push(container),
        }
    }

    async fn reply(&self, reply: Reply) {
        let result = self.writer.write(&self.containers).await;
        if reply.send(result).is_err() {
            error!("Failed to send registry response - receiver dropped");
        }
    }
}
