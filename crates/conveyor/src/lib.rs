// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log collection sidecar for container hosts.
//!
//! Containers opt in through `CONVEYOR_*` environment directives. The crate resolves the
//! declared log sources into host paths, keeps the owned container set in step with the
//! runtime's lifecycle events, and drives a Filebeat process that ships them.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod conveyor;
pub mod directive;
pub mod docker;
pub mod error;
pub mod filebeat;
pub mod porter;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod supervisor;

pub use config::ConveyorConfig;
pub use conveyor::{is_owned, Conveyor};
pub use docker::DockerRuntime;
pub use error::{ConfigError, ConveyorError, PorterError, RuntimeError, SupervisorError};
pub use filebeat::{FilebeatOptions, FilebeatPorter};
pub use porter::Porter;
pub use resolver::{ContainerInfo, Resolver};
pub use runtime::{ContainerEvent, ContainerInspection, ContainerRuntime, EventAction, Mount};
