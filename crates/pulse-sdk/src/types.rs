// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Identifiers, options and outcomes shared by workflows, activities and backends.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Workflow and activity payloads are JSON values.
pub type Payload = serde_json::Value;

/// Stable identifier of a logical workflow. Survives continue-as-new.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkflowId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identifier of one execution record of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Fresh random run id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named queue routing workflow tasks to workers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskQueue(String);

impl TaskQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Retry schedule for an activity invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_interval: Duration,
    /// Multiplier applied to the delay after each retry
    pub backoff: f64,
}

impl RetryConfig {
    /// A single attempt: failures surface immediately.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_interval: Duration::from_secs(1),
            backoff: 2.0,
        }
    }

    /// Delay to wait after attempt `attempt` (1-based) failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.backoff.max(1.0).powi(attempt.saturating_sub(1) as i32);
        self.initial_interval.mul_f64(factor)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::no_retry()
    }
}

/// Per-invocation options for `WorkflowContext::execute_activity`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityOptions {
    /// Deadline for a single attempt
    pub start_to_close_timeout: Duration,
    pub retry: RetryConfig,
}

impl ActivityOptions {
    pub fn with_timeout(start_to_close_timeout: Duration) -> Self {
        Self {
            start_to_close_timeout,
            retry: RetryConfig::default(),
        }
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Thresholds above which the orchestrator suggests continue-as-new.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLimits {
    pub max_events: u64,
    pub max_bytes: u64,
}

impl HistoryLimits {
    /// Whether a history of this size should be truncated.
    pub fn exceeded(&self, events: u64, bytes: u64) -> bool {
        events >= self.max_events || bytes >= self.max_bytes
    }
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            max_events: 10_240,
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

/// A workflow run handed to this worker by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowTask {
    pub workflow_id: WorkflowId,
    pub run_id: RunId,
    pub workflow_type: String,
    pub input: Payload,
    pub limits: HistoryLimits,
    /// Previous run of the same workflow when this run was continued-as-new
    pub continued_from: Option<RunId>,
}

/// Registration sent once per worker process.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerRegistration {
    pub namespace: String,
    pub task_queue: TaskQueue,
    pub workflow_types: Vec<String>,
    pub activity_types: Vec<String>,
    pub identity: String,
}

/// Orchestrator reply to a recorded history event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventAck {
    pub continue_as_new_suggested: bool,
    pub cancel_requested: bool,
}

/// How a run ended, as reported to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed(Payload),
    Failed(String),
    ContinuedAsNew(Payload),
    Cancelled,
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            RunOutcome::Completed(_) => RunStatus::Completed,
            RunOutcome::Failed(_) => RunStatus::Failed,
            RunOutcome::ContinuedAsNew(_) => RunStatus::ContinuedAsNew,
            RunOutcome::Cancelled => RunStatus::Cancelled,
        }
    }
}

/// Lifecycle status of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Waiting for a worker to pick it up
    Scheduled,
    Running,
    Completed,
    Failed,
    ContinuedAsNew,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Scheduled | RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Scheduled => "scheduled",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::ContinuedAsNew => "continued_as_new",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}
