// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Restart-forever supervision of the external agent process.
//!
//! The supervisor cycles through `NotRunning -> Starting -> Running -> NotRunning` until it is
//! cancelled. Spawn failures and exits of any kind are logged and followed by a fixed backoff;
//! retries never run out.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SupervisorError;

pub const DEFAULT_RESTART_BACKOFF: Duration = Duration::from_secs(2);

/// Knows how to prepare and launch one agent.
#[async_trait]
pub trait AgentLauncher: Send + Sync {
    /// Runs on every entry to `Starting`, before the process is spawned.
    async fn prepare(&self) -> Result<(), SupervisorError>;

    fn program(&self) -> PathBuf;

    fn args(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    NotRunning,
    Starting,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentStatus {
    pub state: AgentState,
    /// Processes spawned so far.
    pub launches: u64,
    /// Launch attempts that ended, whether they failed to spawn or the process exited.
    pub failures: u64,
}

enum Outcome {
    Exited(ExitStatus),
    Cancelled,
}

pub struct ProcessSupervisor<L> {
    launcher: L,
    backoff: Duration,
    status: watch::Sender<AgentStatus>,
}

impl<L: AgentLauncher> ProcessSupervisor<L> {
    pub fn new(launcher: L, backoff: Duration) -> Self {
        let (status, _) = watch::channel(AgentStatus {
            state: AgentState::NotRunning,
            launches: 0,
            failures: 0,
        });
        Self {
            launcher,
            backoff,
            status,
        }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn status(&self) -> AgentStatus {
        *self.status.borrow()
    }

    /// Receives every status transition.
    pub fn subscribe(&self) -> watch::Receiver<AgentStatus> {
        self.status.subscribe()
    }

    /// Supervises the agent until `cancel` fires. A running process is killed on cancellation.
    pub async fn run(&self, cancel: CancellationToken) {
        while !cancel.is_cancelled() {
            self.set_state(AgentState::Starting);

            match self.launch(&cancel).await {
                Ok(Outcome::Cancelled) => break,
                Ok(Outcome::Exited(status)) => {
                    warn!(
                        "Agent {} exited with {status}, restarting in {:?}",
                        self.launcher.program().display(),
                        self.backoff
                    );
                }
                Err(e) => warn!("Restarting agent in {:?}: {e}", self.backoff),
            }

            self.status.send_modify(|s| {
                s.state = AgentState::NotRunning;
                s.failures += 1;
            });

            tokio::select! {
                () = tokio::time::sleep(self.backoff) => {}
                () = cancel.cancelled() => break,
            }
        }

        self.set_state(AgentState::NotRunning);
        debug!("Agent supervisor stopped");
    }

    async fn launch(&self, cancel: &CancellationToken) -> Result<Outcome, SupervisorError> {
        self.launcher.prepare().await?;

        let program = self.launcher.program();
        info!("EVENT[START]: {} process", program.display());
        let mut child = Command::new(&program)
            .args(self.launcher.args())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                program: program.clone(),
                source,
            })?;

        self.status.send_modify(|s| {
            s.state = AgentState::Running;
            s.launches += 1;
        });

        tokio::select! {
            status = child.wait() => {
                status.map(Outcome::Exited).map_err(SupervisorError::Wait)
            }
            () = cancel.cancelled() => {
                debug!("Stopping agent {}", program.display());
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill agent {}: {e}", program.display());
                }
                Ok(Outcome::Cancelled)
            }
        }
    }

    fn set_state(&self, state: AgentState) {
        self.status.send_modify(|s| s.state = state);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tracing_test::traced_test;

    struct ScriptLauncher {
        script: PathBuf,
        prepared: AtomicU64,
    }

    #[async_trait]
    impl AgentLauncher for ScriptLauncher {
        async fn prepare(&self) -> Result<(), SupervisorError> {
            self.prepared.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn program(&self) -> PathBuf {
            self.script.clone()
        }

        fn args(&self) -> Vec<String> {
            vec!["-c".to_string(), "filebeat.yaml".to_string()]
        }
    }

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let script = dir.join("agent.sh");
        std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    async fn wait_for(
        rx: &mut watch::Receiver<AgentStatus>,
        f: impl Fn(&AgentStatus) -> bool,
    ) -> AgentStatus {
        tokio::time::timeout(Duration::from_secs(10), rx.wait_for(|s| f(s)))
            .await
            .expect("timed out waiting for agent status")
            .map(|s| *s)
            .expect("supervisor dropped")
    }

    #[tokio::test]
    #[traced_test]
    async fn test_restarts_after_failures_and_keeps_running() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("count");
        // fails on the first two launches, stays up on the third
        let script = write_script(
            dir.path(),
            &format!(
                concat!(
                    "echo run >> {0}\n",
                    "n=$(wc -l < {0} | tr -d ' ')\n",
                    "if [ \"$n\" -le 2 ]; then exit 1; fi\n",
                    "exec sleep 30",
                ),
                counter.display()
            ),
        );

        let supervisor = std::sync::Arc::new(ProcessSupervisor::new(
            ScriptLauncher {
                script,
                prepared: AtomicU64::new(0),
            },
            Duration::from_millis(50),
        ));
        let mut rx = supervisor.subscribe();
        let cancel = CancellationToken::new();

        let task = {
            let supervisor = supervisor.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { supervisor.run(cancel).await })
        };

        let status = wait_for(&mut rx, |s| {
            s.launches == 3 && s.state == AgentState::Running
        })
        .await;
        assert_eq!(status.failures, 2);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let status = supervisor.status();
        assert_eq!(status.state, AgentState::Running);
        assert_eq!(status.launches, 3);
        assert_eq!(supervisor.launcher().prepared.load(Ordering::SeqCst), 3);
        assert!(logs_contain("exited with"));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(supervisor.status().state, AgentState::NotRunning);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = std::sync::Arc::new(ProcessSupervisor::new(
            ScriptLauncher {
                script: dir.path().join("missing-agent"),
                prepared: AtomicU64::new(0),
            },
            Duration::from_millis(10),
        ));
        let mut rx = supervisor.subscribe();
        let cancel = CancellationToken::new();

        let task = {
            let supervisor = supervisor.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { supervisor.run(cancel).await })
        };

        let status = wait_for(&mut rx, |s| s.failures >= 3).await;
        assert_eq!(status.launches, 0);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_supervisor_does_not_launch() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(
            ScriptLauncher {
                script: write_script(dir.path(), "exit 0"),
                prepared: AtomicU64::new(0),
            },
            Duration::from_millis(10),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        supervisor.run(cancel).await;
        assert_eq!(supervisor.status().launches, 0);
        assert_eq!(supervisor.launcher().prepared.load(Ordering::SeqCst), 0);
    }
}
