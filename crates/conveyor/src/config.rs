// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::filebeat::{FilebeatOptions, DEFAULT_BASE_DIR, DEFAULT_EXEC_BIN};
use crate::resolver::DEFAULT_HOST_MOUNT;
use crate::supervisor::DEFAULT_RESTART_BACKOFF;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Process configuration of the sidecar.
#[derive(Debug, Clone)]
pub struct ConveyorConfig {
    /// Instance name containers opt into through `CONVEYOR_NAME`
    pub name: String,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
    /// Directory the host filesystem is mounted at
    pub host_mount: String,
    /// Filebeat base directory
    pub filebeat_dir: PathBuf,
    /// Filebeat executable, relative to `filebeat_dir` unless absolute
    pub filebeat_bin: PathBuf,
    pub restart_backoff: Duration,
    /// Docker unix socket; local defaults are used when unset
    pub docker_socket: Option<String>,
}

impl Default for ConveyorConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            log_level: "info".to_string(),
            host_mount: DEFAULT_HOST_MOUNT.to_string(),
            filebeat_dir: PathBuf::from(DEFAULT_BASE_DIR),
            filebeat_bin: PathBuf::from(DEFAULT_EXEC_BIN),
            restart_backoff: DEFAULT_RESTART_BACKOFF,
            docker_socket: None,
        }
    }
}

impl ConveyorConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let name = env::var("CONVEYOR_NAME").unwrap_or_default();
        let log_level = env::var("CONVEYOR_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or(defaults.log_level);
        let host_mount = env::var("CONVEYOR_HOST_MOUNT").unwrap_or(defaults.host_mount);
        let filebeat_dir = env::var("CONVEYOR_FILEBEAT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.filebeat_dir);
        let filebeat_bin = env::var("CONVEYOR_FILEBEAT_BIN")
            .map(PathBuf::from)
            .unwrap_or(defaults.filebeat_bin);
        let restart_backoff = match env::var("CONVEYOR_RESTART_BACKOFF_SECS") {
            Ok(val) => val.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| {
                ConfigError::Invalid(format!(
                    "CONVEYOR_RESTART_BACKOFF_SECS must be a whole number of seconds, got '{val}'"
                ))
            })?,
            Err(_) => defaults.restart_backoff,
        };
        let docker_socket = env::var("CONVEYOR_DOCKER_SOCKET")
            .ok()
            .filter(|socket| !socket.trim().is_empty());

        let config = Self {
            name,
            log_level,
            host_mount,
            filebeat_dir,
            filebeat_bin,
            restart_backoff,
            docker_socket,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        if !Path::new(&self.host_mount).is_absolute() {
            return Err(ConfigError::Invalid(format!(
                "CONVEYOR_HOST_MOUNT must be an absolute path, got '{}'",
                self.host_mount
            )));
        }

        if self.filebeat_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "CONVEYOR_FILEBEAT_DIR cannot be empty".to_string(),
            ));
        }

        if self.filebeat_bin.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "CONVEYOR_FILEBEAT_BIN cannot be empty".to_string(),
            ));
        }

        if self.restart_backoff.is_zero() {
            return Err(ConfigError::Invalid(
                "Restart backoff must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn filebeat_options(&self) -> FilebeatOptions {
        FilebeatOptions {
            base_dir: self.filebeat_dir.clone(),
            exec_bin: self.filebeat_bin.clone(),
            restart_backoff: self.restart_backoff,
            ..FilebeatOptions::default()
        }
    }
}
