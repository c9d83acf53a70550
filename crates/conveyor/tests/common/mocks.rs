// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock implementations of the runtime and porter seams

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bollard::errors::Error as DockerError;
use conveyor::runtime::EventStream;
use conveyor::{
    ContainerEvent, ContainerInfo, ContainerInspection, ContainerRuntime, EventAction, Porter,
    PorterError, RuntimeError,
};
use futures::channel::mpsc;
use tokio_util::sync::CancellationToken;

/// Runtime serving fixed inspections and scripted event subscriptions.
///
/// Each call to `events` takes the next scripted subscription. Once they run out it opens a live
/// subscription, which only receives events emitted after it was opened.
#[derive(Default)]
pub struct MockRuntime {
    containers: Mutex<Vec<ContainerInspection>>,
    failing: Mutex<HashSet<String>>,
    list_fails: AtomicBool,
    subscriptions: Mutex<VecDeque<EventStream>>,
    live: Mutex<Vec<mpsc::UnboundedSender<Result<ContainerEvent, RuntimeError>>>>,
    starting: Mutex<Option<ContainerInspection>>,
    pub subscribed: AtomicUsize,
    pub inspected: AtomicUsize,
}

#[allow(dead_code)]
impl MockRuntime {
    pub fn new(containers: Vec<ContainerInspection>) -> Self {
        Self {
            containers: Mutex::new(containers),
            ..Default::default()
        }
    }

    /// Makes a container visible to listing and inspection.
    pub fn insert(&self, container: ContainerInspection) {
        self.containers.lock().unwrap().push(container);
    }

    pub fn fail_inspect(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_list(&self) {
        self.list_fails.store(true, Ordering::SeqCst);
    }

    /// Starts `container` while the next listing is in flight: it is missing from the listing
    /// and its start event goes to the subscriptions open at that point.
    pub fn start_during_list(&self, container: ContainerInspection) {
        *self.starting.lock().unwrap() = Some(container);
    }

    /// Adds a subscription whose events are pushed through the returned sender.
    pub fn script(&self) -> mpsc::UnboundedSender<Result<ContainerEvent, RuntimeError>> {
        let (tx, rx) = mpsc::unbounded();
        self.subscriptions.lock().unwrap().push_back(Box::pin(rx));
        tx
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn list_running(&self) -> Result<Vec<String>, RuntimeError> {
        if self.list_fails.load(Ordering::SeqCst) {
            return Err(RuntimeError::List(server_error(500)));
        }
        let ids = self
            .containers
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.id.clone())
            .collect();

        if let Some(container) = self.starting.lock().unwrap().take() {
            let event = ContainerEvent::new(EventAction::Start, container.id.clone());
            self.containers.lock().unwrap().push(container);
            self.live
                .lock()
                .unwrap()
                .retain(|tx| tx.unbounded_send(Ok(event.clone())).is_ok());
        }
        Ok(ids)
    }

    async fn inspect(&self, id: &str) -> Result<ContainerInspection, RuntimeError> {
        self.inspected.fetch_add(1, Ordering::SeqCst);
        let inspection = if self.failing.lock().unwrap().contains(id) {
            None
        } else {
            self.containers
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.id == id)
                .cloned()
        };
        inspection.ok_or_else(|| RuntimeError::Inspect {
            id: id.to_string(),
            source: server_error(404),
        })
    }

    fn events(&self) -> EventStream {
        self.subscribed.fetch_add(1, Ordering::SeqCst);
        if let Some(stream) = self.subscriptions.lock().unwrap().pop_front() {
            return stream;
        }
        let (tx, rx) = mpsc::unbounded();
        self.live.lock().unwrap().push(tx);
        Box::pin(rx)
    }
}

fn server_error(status_code: u16) -> DockerError {
    DockerError::DockerResponseServerError {
        status_code,
        message: "mock runtime".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PorterOp {
    List(Vec<ContainerInfo>),
    Create(ContainerInfo),
    Delete(String),
}

/// Porter recording every call.
#[derive(Default)]
pub struct RecordingPorter {
    ops: Mutex<Vec<PorterOp>>,
    fail: AtomicBool,
    pub running: AtomicBool,
    pub stopped: AtomicBool,
}

#[allow(dead_code)]
impl RecordingPorter {
    pub fn ops(&self) -> Vec<PorterOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn fail_writes(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    fn record(&self, op: PorterOp) -> Result<(), PorterError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PorterError::RegistryClosed);
        }
        self.ops.lock().unwrap().push(op);
        Ok(())
    }
}

#[async_trait]
impl Porter for RecordingPorter {
    async fn list(&self, containers: Vec<ContainerInfo>) -> Result<(), PorterError> {
        self.record(PorterOp::List(containers))
    }

    async fn create(&self, container: ContainerInfo) -> Result<(), PorterError> {
        self.record(PorterOp::Create(container))
    }

    async fn delete(&self, container: &ContainerInfo) -> Result<(), PorterError> {
        self.record(PorterOp::Delete(container.id.clone()))
    }

    async fn run(&self, cancel: CancellationToken) {
        self.running.store(true, Ordering::SeqCst);
        cancel.cancelled().await;
        self.stopped.store(true, Ordering::SeqCst);
    }
}
