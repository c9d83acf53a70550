// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! [`Porter`] driving a Filebeat process.
//!
//! Filebeat runs against a static base configuration that enables input reloading from
//! `<base_dir>/configs/*.yaml`. Every change to the owned container set rewrites
//! `<base_dir>/configs/config.yaml`, which Filebeat picks up without a restart.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use handlebars::{handlebars_helper, Handlebars};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PorterError, SupervisorError};
use crate::porter::Porter;
use crate::registry::{ConfigWriter, RegistryHandle, RegistryService};
use crate::resolver::ContainerInfo;
use crate::supervisor::{AgentLauncher, ProcessSupervisor, DEFAULT_RESTART_BACKOFF};

pub const DEFAULT_BASE_DIR: &str = "/etc/filebeat";
pub const DEFAULT_EXEC_BIN: &str = "filebeat";

pub const DEFAULT_BASE_CONFIG_FILE: &str = "filebeat.yaml";
pub const DEFAULT_CUSTOM_TEMPLATE_FILE: &str = "config.tmpl";

const CONFIGS_DIR: &str = "configs";
const CUSTOM_CONFIG_FILE: &str = "config.yaml";
const TEMPLATE_NAME: &str = "filebeat";

// refer https://www.elastic.co/guide/en/beats/libbeat/7.x/config-file-permissions.html
#[cfg(unix)]
const BASE_CONFIG_MODE: u32 = 0o644;

/// Default per-container inputs. Each container with at least one resolved path becomes one
/// `log` input carrying its labels as fields.
pub const DEFAULT_CUSTOM_TEMPLATE: &str = concat!(
    "- type: log\n",
    "  paths:\n",
    "  - \"/tmp/tmp.log\"\n",
    "{{#each this}}{{#if log_path}}- type: log\n",
    "  paths:\n",
    "{{#each log_path}}  - {{yaml this}}\n",
    "{{/each}}  fields:\n",
    "{{#each labels}}    {{yaml @key}}: {{yaml this}}\n",
    "{{/each}}{{/if}}{{/each}}",
);

fn default_base_config(configs_dir: &Path) -> String {
    format!(
        concat!(
            "filebeat.config.inputs:\n",
            "  enabled: true\n",
            "  path: {}/*.yaml\n",
            "  reload.enabled: true\n",
            "  reload.period: 10s\n",
            "output.console:\n",
            "  pretty: true\n",
        ),
        configs_dir.display()
    )
}

#[derive(Debug, Clone)]
pub struct FilebeatOptions {
    pub base_dir: PathBuf,
    /// Filebeat executable, resolved under `base_dir` when relative.
    pub exec_bin: PathBuf,
    pub base_config_file: String,
    pub custom_template_file: String,
    pub restart_backoff: Duration,
}

impl Default for FilebeatOptions {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            exec_bin: PathBuf::from(DEFAULT_EXEC_BIN),
            base_config_file: DEFAULT_BASE_CONFIG_FILE.to_string(),
            custom_template_file: DEFAULT_CUSTOM_TEMPLATE_FILE.to_string(),
            restart_backoff: DEFAULT_RESTART_BACKOFF,
        }
    }
}

impl FilebeatOptions {
    pub fn base_config_path(&self) -> PathBuf {
        self.base_dir.join(&self.base_config_file)
    }

    pub fn configs_dir(&self) -> PathBuf {
        self.base_dir.join(CONFIGS_DIR)
    }

    pub fn custom_config_path(&self) -> PathBuf {
        self.configs_dir().join(CUSTOM_CONFIG_FILE)
    }

    /// Optional user supplied replacement of [`DEFAULT_CUSTOM_TEMPLATE`].
    pub fn custom_template_path(&self) -> PathBuf {
        self.configs_dir().join(&self.custom_template_file)
    }

    pub fn exec_path(&self) -> PathBuf {
        self.base_dir.join(&self.exec_bin)
    }
}

// A JSON string literal is also a valid YAML double-quoted scalar.
handlebars_helper!(yaml: |value: Json| serde_json::to_string(value).unwrap_or_default());

/// Renders the per-container inputs file.
///
/// Templates can use the `yaml` helper to emit a value as a quoted YAML scalar.
pub struct FilebeatConfig {
    registry: Handlebars<'static>,
    path: PathBuf,
}

impl FilebeatConfig {
    pub fn new(template: &str, path: PathBuf) -> Result<Self, PorterError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.register_helper("yaml", Box::new(yaml));
        registry
            .register_template_string(TEMPLATE_NAME, template)
            .map_err(|e| PorterError::Template(e.to_string()))?;
        Ok(Self { registry, path })
    }

    pub fn render(&self, containers: &[ContainerInfo]) -> Result<String, PorterError> {
        self.registry
            .render(TEMPLATE_NAME, &containers)
            .map_err(|e| PorterError::Render(e.to_string()))
    }
}

#[async_trait]
impl ConfigWriter for FilebeatConfig {
    async fn write(&self, containers: &[ContainerInfo]) -> Result<(), PorterError> {
        let content = self.render(containers)?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|source| PorterError::Write {
                path: self.path.clone(),
                source,
            })?;
        debug!(
            "Wrote {} with {} container inputs",
            self.path.display(),
            containers.len()
        );
        Ok(())
    }
}

/// Launches `filebeat -c <base config>`.
///
/// The base configuration found on disk at construction is kept and written back whenever the
/// file goes missing; the default one is used when there was none.
pub struct FilebeatLauncher {
    exec_path: PathBuf,
    base_config_path: PathBuf,
    base_config: String,
}

impl FilebeatLauncher {
    pub fn new(options: &FilebeatOptions) -> Self {
        let base_config_path = options.base_config_path();
        let base_config = match std::fs::read_to_string(&base_config_path) {
            Ok(content) => {
                info!("Using base configuration {}", base_config_path.display());
                content
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                default_base_config(&options.configs_dir())
            }
            Err(e) => {
                warn!(
                    "Unable to read {}, falling back to the default base configuration: {e}",
                    base_config_path.display()
                );
                default_base_config(&options.configs_dir())
            }
        };
        Self {
            exec_path: options.exec_path(),
            base_config_path,
            base_config,
        }
    }
}

#[async_trait]
impl AgentLauncher for FilebeatLauncher {
    async fn prepare(&self) -> Result<(), SupervisorError> {
        let prepare_error = |source| SupervisorError::Prepare {
            path: self.base_config_path.clone(),
            source,
        };
        if tokio::fs::try_exists(&self.base_config_path)
            .await
            .map_err(prepare_error)?
        {
            return Ok(());
        }

        debug!(
            "Writing base configuration to {}",
            self.base_config_path.display()
        );
        tokio::fs::write(&self.base_config_path, &self.base_config)
            .await
            .map_err(prepare_error)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(
                &self.base_config_path,
                std::fs::Permissions::from_mode(BASE_CONFIG_MODE),
            )
            .await
            .map_err(prepare_error)?;
        }
        Ok(())
    }

    fn program(&self) -> PathBuf {
        self.exec_path.clone()
    }

    fn args(&self) -> Vec<String> {
        vec![
            "-c".to_string(),
            self.base_config_path.display().to_string(),
        ]
    }
}

pub struct FilebeatPorter {
    registry: RegistryHandle,
    supervisor: ProcessSupervisor<FilebeatLauncher>,
}

impl FilebeatPorter {
    /// Prepares the configuration directory and compiles the inputs template.
    ///
    /// The returned [`RegistryService`] owns the container set and must be spawned before the
    /// porter is used. A malformed user template is reported as [`PorterError::Template`].
    pub fn new(options: FilebeatOptions) -> Result<(Self, RegistryService), PorterError> {
        let configs_dir = options.configs_dir();
        std::fs::create_dir_all(&configs_dir).map_err(|source| PorterError::Write {
            path: configs_dir.clone(),
            source,
        })?;

        let template_path = options.custom_template_path();
        let template = match std::fs::read_to_string(&template_path) {
            Ok(template) => {
                info!("Using inputs template {}", template_path.display());
                template
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                DEFAULT_CUSTOM_TEMPLATE.to_string()
            }
            Err(e) => {
                return Err(PorterError::Template(format!(
                    "unable to read {}: {e}",
                    template_path.display()
                )))
            }
        };

        let config = FilebeatConfig::new(&template, options.custom_config_path())?;
        let (service, registry) = RegistryService::new(Box::new(config));

        let supervisor =
            ProcessSupervisor::new(FilebeatLauncher::new(&options), options.restart_backoff);

        Ok((
            Self {
                registry,
                supervisor,
            },
            service,
        ))
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    pub fn supervisor(&self) -> &ProcessSupervisor<FilebeatLauncher> {
        &self.supervisor
    }
}

#[async_trait]
impl Porter for FilebeatPorter {
    async fn list(&self, containers: Vec<ContainerInfo>) -> Result<(), PorterError> {
        info!("EVENT[LIST]: {} containers", containers.len());
        self.registry.replace(containers).await
    }

    async fn create(&self, container: ContainerInfo) -> Result<(), PorterError> {
        info!(
            "EVENT[CREATE]: [CONTAINER ID]: {} [CONTAINER NAME]: {}",
            container.short_id(),
            container.name
        );
        self.registry.add(container).await
    }

    async fn delete(&self, container: &ContainerInfo) -> Result<(), PorterError> {
        info!(
            "EVENT[DELETE]: [CONTAINER ID]: {} [CONTAINER NAME]: {}",
            container.short_id(),
            container.name
        );
        self.registry.remove(&container.id).await
    }

    async fn run(&self, cancel: CancellationToken) {
        self.supervisor.run(cancel).await;
    }
}
