// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use conveyor::{Conveyor, ConveyorConfig, DockerRuntime, FilebeatPorter, Resolver};

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = match ConveyorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            // no subscriber yet
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let env_filter = format!("h2=off,hyper=off,hyper_util=off,bollard=off,{}", config.log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let runtime = match &config.docker_socket {
        Some(socket) => DockerRuntime::connect_with_unix(socket),
        None => DockerRuntime::connect_with_local_defaults(),
    };
    let runtime = match runtime {
        Ok(runtime) => Arc::new(runtime),
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let (porter, registry) = match FilebeatPorter::new(config.filebeat_options()) {
        Ok(porter) => porter,
        Err(e) => {
            error!("Error creating filebeat porter: {e}");
            return ExitCode::FAILURE;
        }
    };
    tokio::spawn(registry.run());

    let conveyor = Conveyor::new(
        config.name.clone(),
        runtime,
        Resolver::new(config.host_mount.clone()),
        Arc::new(porter),
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = wait_for_shutdown_signal().await {
                error!("Unable to listen for shutdown signals: {e}");
                return;
            }
            info!("Shutdown signal received");
            cancel.cancel();
        });
    }

    info!("Starting conveyor '{}'", config.name);
    match conveyor.run(cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = sigterm.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
