// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::PorterError;
use crate::resolver::ContainerInfo;

/// Turns the set of owned containers into a running, correctly configured log shipping agent.
#[async_trait]
pub trait Porter: Send + Sync {
    /// Replaces the whole owned set and regenerates the agent configuration.
    async fn list(&self, containers: Vec<ContainerInfo>) -> Result<(), PorterError>;

    /// Adds one record to the owned set and regenerates the agent configuration.
    async fn create(&self, container: ContainerInfo) -> Result<(), PorterError>;

    /// Removes every record of the container and regenerates the agent configuration.
    async fn delete(&self, container: &ContainerInfo) -> Result<(), PorterError>;

    /// Keeps the agent process running until `cancel` fires.
    async fn run(&self, cancel: CancellationToken);
}
