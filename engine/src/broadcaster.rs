//! Periodic status push.
//!
//! Every `interval` the broadcaster takes a snapshot of the open connections,
//! asks the engine for one status, and queues it on each connection. Newly
//! opened connections get an immediate push through [`StatusReporter`] so they
//! do not wait for the next tick.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::connections::{ConnectionHandle, ConnectionRegistry};
use crate::engine::SharedEngine;

/// Default time between two broadcast ticks.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Outcome of one broadcast tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Queries the engine and queues encoded status on connections.
#[derive(Clone)]
pub struct StatusReporter {
    engine: SharedEngine,
    registry: ConnectionRegistry,
}

impl StatusReporter {
    pub fn new(engine: SharedEngine, registry: ConnectionRegistry) -> Self {
        Self { engine, registry }
    }

    /// Current engine status, encoded for the wire. `None` if the engine call
    /// failed (already logged).
    async fn encoded_status(&self) -> Option<String> {
        let status = match self.engine.status().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("engine status query failed: {e}");
                return None;
            }
        };
        match status.encode() {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!("failed to encode status: {e}");
                None
            }
        }
    }

    /// Push one status snapshot to a single connection.
    pub async fn report_to(&self, conn: &ConnectionHandle) -> bool {
        let Some(text) = self.encoded_status().await else {
            return false;
        };
        match conn.send(text) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("status push failed: {e}");
                false
            }
        }
    }

    /// Push one status snapshot to every connection open right now. A failed
    /// send is logged and does not affect the others.
    pub async fn broadcast(&self) -> TickReport {
        let connections = self.registry.snapshot();
        if connections.is_empty() {
            return TickReport::default();
        }
        let Some(text) = self.encoded_status().await else {
            return TickReport {
                delivered: 0,
                failed: connections.len(),
            };
        };

        let mut report = TickReport::default();
        for conn in &connections {
            match conn.send(text.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!("status push failed: {e}");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcasterState {
    Stopped,
    Running,
    Draining,
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct StatusBroadcaster {
    reporter: StatusReporter,
    interval: Duration,
    state: BroadcasterState,
    running: Option<Running>,
}

impl StatusBroadcaster {
    pub fn new(reporter: StatusReporter, interval: Duration) -> Self {
        Self {
            reporter,
            interval,
            state: BroadcasterState::Stopped,
            running: None,
        }
    }

    pub fn state(&self) -> BroadcasterState {
        self.state
    }

    /// Spawn the broadcast loop. It runs until `cancel` fires or [`stop`] is
    /// called. Starting a running broadcaster does nothing.
    ///
    /// [`stop`]: StatusBroadcaster::stop
    pub fn start(&mut self, cancel: CancellationToken) {
        if self.running.is_some() {
            return;
        }
        let task = tokio::spawn(run(self.reporter.clone(), self.interval, cancel.clone()));
        self.running = Some(Running { cancel, task });
        self.state = BroadcasterState::Running;
        tracing::info!("status broadcaster started, every {:?}", self.interval);
    }

    /// Cancel the loop and wait for it to exit. An in-flight tick is allowed
    /// to finish; nothing is sent after this returns.
    pub async fn stop(&mut self) {
        let Some(Running { cancel, task }) = self.running.take() else {
            return;
        };
        self.state = BroadcasterState::Draining;
        cancel.cancel();
        if let Err(e) = task.await {
            tracing::warn!("status broadcaster task failed: {e}");
        }
        self.state = BroadcasterState::Stopped;
        tracing::info!("status broadcaster stopped");
    }
}

async fn run(reporter: StatusReporter, interval: Duration, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        let report = reporter.broadcast().await;
        if report.failed > 0 {
            tracing::debug!("broadcast tick: {} delivered, {} failed", report.delivered, report.failed);
        }
    }
    tracing::debug!("status broadcaster draining");
}
