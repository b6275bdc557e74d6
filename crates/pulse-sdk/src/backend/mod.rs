// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Orchestrator backends.
//!
//! - `quic`: remote orchestrator over QUIC with mutual TLS
//! - `embedded`: in-process orchestrator for local runs and tests

pub mod embedded;
pub mod quic;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::history::HistoryEvent;
use crate::types::{EventAck, RunId, RunOutcome, TaskQueue, WorkerRegistration, WorkflowTask};

/// Everything a worker needs from the orchestration service.
///
/// The orchestrator owns scheduling and history storage and sets the
/// continue-as-new limits; the worker executes runs and reports what happened.
#[async_trait]
pub trait OrchestratorBackend: Send + Sync {
    /// Connect to the backend (no-op for embedded).
    async fn connect(&self) -> Result<()>;

    /// Close the connection (no-op for embedded).
    async fn close(&self);

    /// Register the worker's task queue and types. Returns the worker id.
    async fn register_worker(&self, registration: &WorkerRegistration) -> Result<String>;

    /// Long-poll for the next run on `task_queue`, waiting at most `wait`.
    async fn poll_workflow_task(
        &self,
        worker_id: &str,
        task_queue: &TaskQueue,
        wait: Duration,
    ) -> Result<Option<WorkflowTask>>;

    /// Append an event to the run's history.
    async fn record_event(&self, run_id: &RunId, event: &HistoryEvent) -> Result<EventAck>;

    /// Liveness ping for a run. Returns whether cancellation was requested.
    async fn heartbeat(&self, run_id: &RunId) -> Result<bool>;

    /// Report the outcome of a run. Returns the next run id on continue-as-new.
    async fn complete_run(&self, run_id: &RunId, outcome: &RunOutcome) -> Result<Option<RunId>>;
}
