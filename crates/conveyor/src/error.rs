// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

/// Errors talking to the container runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Failed to connect to container runtime: {0}")]
    Connect(#[source] bollard::errors::Error),

    #[error("Failed to list containers: {0}")]
    List(#[source] bollard::errors::Error),

    #[error("Failed to inspect container {id}: {source}")]
    Inspect {
        id: String,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("Container event stream error: {0}")]
    EventStream(String),
}

/// Errors surfaced by a porter to its caller.
#[derive(Debug, thiserror::Error)]
pub enum PorterError {
    #[error("Invalid configuration template: {0}")]
    Template(String),

    #[error("Failed to render configuration: {0}")]
    Render(String),

    #[error("Failed to write configuration file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Container registry is not running")]
    RegistryClosed,
}

/// Errors raised while launching or waiting on the agent process.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Failed to prepare agent base configuration {path}: {source}")]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn agent {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait on agent process: {0}")]
    Wait(#[source] std::io::Error),
}

/// Invalid process configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top level errors of the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum ConveyorError {
    #[error("Unable to establish initial container state: {0}")]
    InitialList(#[source] RuntimeError),

    #[error(transparent)]
    Porter(#[from] PorterError),
}
