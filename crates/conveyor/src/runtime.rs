// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Boundary to the container runtime.

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::RuntimeError;

/// One bind mount of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Path on the host.
    pub source: String,
    /// Path inside the container.
    pub destination: String,
}

/// The parts of a container inspection the resolver works on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerInspection {
    pub id: String,
    /// Container name without the runtime's leading `/`.
    pub name: String,
    /// Raw `KEY=VALUE` environment of the container.
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    /// Host path of the runtime's console log file for this container.
    pub log_path: String,
    pub mounts: Vec<Mount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    Start,
    Restart,
    Die,
    Destroy,
    Other(String),
}

impl From<&str> for EventAction {
    fn from(action: &str) -> Self {
        match action {
            "start" => EventAction::Start,
            "restart" => EventAction::Restart,
            "die" => EventAction::Die,
            "destroy" => EventAction::Destroy,
            other => EventAction::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventAction::Start => write!(f, "start"),
            EventAction::Restart => write!(f, "restart"),
            EventAction::Die => write!(f, "die"),
            EventAction::Destroy => write!(f, "destroy"),
            EventAction::Other(action) => write!(f, "{action}"),
        }
    }
}

/// A lifecycle event of one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEvent {
    pub action: EventAction,
    pub container_id: String,
}

impl ContainerEvent {
    pub fn new(action: impl Into<EventAction>, container_id: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            container_id: container_id.into(),
        }
    }
}

/// Container events in delivery order. An `Err` item is a transient failure after which the
/// subscription should be re-established; the end of the stream is terminal.
pub type EventStream =
    Pin<Box<dyn Stream<Item = Result<ContainerEvent, RuntimeError>> + Send>>;

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Ids of the currently running containers.
    async fn list_running(&self) -> Result<Vec<String>, RuntimeError>;

    async fn inspect(&self, id: &str) -> Result<ContainerInspection, RuntimeError>;

    /// Subscribes to container lifecycle events.
    ///
    /// The subscription is open once this returns. Events that happen before the stream is
    /// first polled are delivered, not lost.
    fn events(&self) -> EventStream;
}
