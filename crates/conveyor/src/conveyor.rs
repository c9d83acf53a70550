// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reconciliation of runtime state with the porter.
//!
//! [`Conveyor`] performs one full sync of the running containers at startup and then follows
//! the runtime's event stream, turning lifecycle events of owned containers into incremental
//! porter operations.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::directive::{ENV_ENABLED, ENV_NAME};
use crate::error::{ConveyorError, RuntimeError};
use crate::porter::Porter;
use crate::resolver::{self, ContainerInfo, Resolver};
use crate::runtime::{ContainerEvent, ContainerRuntime, EventAction, EventStream};

/// Whether the instance called `name` collects logs for `container`.
///
/// A container opts in with `CONVEYOR_ENABLED=true` and picks its collector with
/// `CONVEYOR_NAME`; an absent name only matches the unnamed instance.
pub fn is_owned(name: &str, container: &ContainerInfo) -> bool {
    let enabled = container.env.get(ENV_ENABLED).map(String::as_str) == Some("true");
    let owner = container.env.get(ENV_NAME).map(String::as_str).unwrap_or("");
    enabled && owner == name
}

#[derive(Clone)]
pub struct Conveyor {
    name: String,
    runtime: Arc<dyn ContainerRuntime>,
    resolver: Resolver,
    porter: Arc<dyn Porter>,
}

impl Conveyor {
    pub fn new(
        name: impl Into<String>,
        runtime: Arc<dyn ContainerRuntime>,
        resolver: Resolver,
        porter: Arc<dyn Porter>,
    ) -> Self {
        Self {
            name: name.into(),
            runtime,
            resolver,
            porter,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved records of every running container owned by this instance.
    ///
    /// Containers that fail inspection are skipped; a failure to list is fatal.
    pub async fn list(&self) -> Result<Vec<ContainerInfo>, ConveyorError> {
        let ids = self
            .runtime
            .list_running()
            .await
            .map_err(ConveyorError::InitialList)?;

        let mut owned = Vec::new();
        for id in ids {
            let inspection = match self.runtime.inspect(&id).await {
                Ok(inspection) => inspection,
                Err(e) => {
                    warn!("Skipping container {}: {e}", resolver::short_id(&id));
                    continue;
                }
            };
            owned.extend(
                self.resolver
                    .resolve(&inspection)
                    .into_iter()
                    .filter(|info| is_owned(&self.name, info)),
            );
        }
        Ok(owned)
    }

    /// Hands the full owned set to the porter.
    pub async fn sync(&self) -> Result<(), ConveyorError> {
        let containers = self.list().await?;
        debug!("Initial sync of {} container records", containers.len());
        self.porter.list(containers).await?;
        Ok(())
    }

    /// Applies one lifecycle event. Porter failures are logged and do not fail the event.
    pub async fn handle_event(&self, event: &ContainerEvent) -> Result<(), RuntimeError> {
        let create = match event.action {
            EventAction::Start | EventAction::Restart => true,
            EventAction::Die | EventAction::Destroy => false,
            EventAction::Other(_) => return Ok(()),
        };

        let inspection = self.runtime.inspect(&event.container_id).await?;
        let infos = self.resolver.resolve(&inspection);
        match infos.first() {
            Some(first) if is_owned(&self.name, first) => {}
            _ => return Ok(()),
        }

        for info in infos {
            let result = if create {
                self.porter.create(info).await
            } else {
                self.porter.delete(&info).await
            };
            if let Err(e) = result {
                error!(
                    "Failed to apply {} of container {}: {e}",
                    event.action,
                    resolver::short_id(&event.container_id)
                );
            }
        }
        Ok(())
    }

    /// Follows `events` until the stream ends or `cancel` fires, resubscribing after errors.
    pub async fn watch(&self, mut events: EventStream, cancel: CancellationToken) {
        loop {
            let next = tokio::select! {
                next = events.next() => next,
                () = cancel.cancelled() => {
                    debug!("Event watcher cancelled");
                    return;
                }
            };

            match next {
                Some(Ok(event)) => {
                    info!(
                        "EVENT[WATCH]: {} {}",
                        event.action,
                        resolver::short_id(&event.container_id)
                    );
                    if let Err(e) = self.handle_event(&event).await {
                        warn!("Dropping {} event: {e}", event.action);
                    }
                }
                Some(Err(e)) => {
                    warn!("Resubscribing to container events: {e}");
                    events = self.runtime.events();
                }
                None => {
                    warn!("Container event stream ended");
                    return;
                }
            }
        }
    }

    /// Syncs, then runs the agent and the event watcher until `cancel` fires.
    ///
    /// Events are subscribed to before the initial listing so nothing that happens while the
    /// listing is in flight is lost.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ConveyorError> {
        let events = self.runtime.events();
        self.sync().await?;

        let agent = {
            let porter = self.porter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { porter.run(cancel).await })
        };
        let watcher = {
            let conveyor = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { conveyor.watch(events, cancel).await })
        };

        cancel.cancelled().await;
        info!("Shutting down conveyor {}", self.name);

        let (agent, watcher) = tokio::join!(agent, watcher);
        if let Err(e) = agent {
            error!("Agent supervisor task failed: {e}");
        }
        if let Err(e) = watcher {
            error!("Event watcher task failed: {e}");
        }
        Ok(())
    }
}
