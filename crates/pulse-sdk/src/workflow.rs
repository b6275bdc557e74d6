// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflows and the context they run in.
//!
//! A workflow body only talks to the outside world through its
//! [`WorkflowContext`]: activities, timers, cancellation and the
//! continue-as-new hint. Every suspension point is recorded as history.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::activity::ActivityContext;
use crate::backend::OrchestratorBackend;
use crate::error::{ActivityError, ActivityErrorKind, WorkflowError};
use crate::history::HistoryEvent;
use crate::registry::Registry;
use crate::types::{ActivityOptions, HistoryLimits, Payload, RunId, WorkflowId, WorkflowTask};

/// How a workflow run ends when it does not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowExit {
    /// The workflow finished with a result.
    Completed(Payload),
    /// Close this run and start a fresh one of the same workflow with this input.
    ContinueAsNew(Payload),
}

/// A workflow type.
#[async_trait]
pub trait Workflow: Send + Sync + 'static {
    async fn run(
        &self,
        ctx: &mut WorkflowContext,
        input: Payload,
    ) -> Result<WorkflowExit, WorkflowError>;
}

/// Cancellation state of one run.
///
/// The token is also cancelled when the worker shuts down; `is_requested`
/// tells an orchestrator cancel apart from a local shutdown.
#[derive(Debug, Clone)]
pub struct RunCancellation {
    token: CancellationToken,
    requested: Arc<AtomicBool>,
}

impl RunCancellation {
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark the run as cancelled by the orchestrator.
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.token.cancel();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Handle a workflow body uses to interact with its run.
pub struct WorkflowContext {
    workflow_id: WorkflowId,
    run_id: RunId,
    workflow_type: String,
    continued_from: Option<RunId>,
    backend: Arc<dyn OrchestratorBackend>,
    registry: Arc<Registry>,
    cancel: RunCancellation,
    limits: HistoryLimits,
    history_length: u64,
    history_bytes: u64,
    continue_as_new_suggested: bool,
    next_seq: u64,
}

impl WorkflowContext {
    pub fn new(
        task: &WorkflowTask,
        backend: Arc<dyn OrchestratorBackend>,
        registry: Arc<Registry>,
        cancel: RunCancellation,
    ) -> Self {
        Self {
            workflow_id: task.workflow_id.clone(),
            run_id: task.run_id.clone(),
            workflow_type: task.workflow_type.clone(),
            continued_from: task.continued_from.clone(),
            backend,
            registry,
            cancel,
            limits: task.limits,
            history_length: 0,
            history_bytes: 0,
            continue_as_new_suggested: false,
            next_seq: 0,
        }
    }

    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn workflow_type(&self) -> &str {
        &self.workflow_type
    }

    /// The run this one was continued from, if any.
    pub fn continued_from(&self) -> Option<&RunId> {
        self.continued_from.as_ref()
    }

    /// Whether the orchestrator asked this run to continue-as-new.
    pub fn continue_as_new_suggested(&self) -> bool {
        self.continue_as_new_suggested
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.token().is_cancelled()
    }

    /// Number of events this run has recorded so far.
    pub fn history_length(&self) -> u64 {
        self.history_length
    }

    /// Append an event to the run's history and absorb the orchestrator's hints.
    ///
    /// The run also checks the limits it was dispatched with, so it asks to
    /// continue-as-new even when the orchestrator does not say so.
    pub(crate) async fn record(&mut self, event: HistoryEvent) -> Result<(), WorkflowError> {
        let size = event.encode()?.len() as u64;
        let ack = self.backend.record_event(&self.run_id, &event).await?;
        self.history_length += 1;
        self.history_bytes += size;

        let suggested = ack.continue_as_new_suggested
            || self.limits.exceeded(self.history_length, self.history_bytes);
        if suggested && !self.continue_as_new_suggested {
            info!(
                run_id = %self.run_id,
                history_length = self.history_length,
                "Orchestrator suggests continue-as-new"
            );
            self.continue_as_new_suggested = true;
        }
        if ack.cancel_requested && !self.cancel.is_requested() {
            info!(run_id = %self.run_id, "Cancellation requested by orchestrator");
            self.cancel.request();
        }
        Ok(())
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Run a registered activity and wait for its result.
    ///
    /// Each attempt gets its own `start_to_close_timeout`; an attempt that runs
    /// past it fails exactly like one that returned an error. Attempts are
    /// retried per `options.retry`. Cancellation of the run interrupts the
    /// in-flight attempt and surfaces as [`WorkflowError::Cancelled`].
    #[instrument(skip(self, input, options), fields(run_id = %self.run_id))]
    pub async fn execute_activity(
        &mut self,
        activity_type: &str,
        input: Payload,
        options: &ActivityOptions,
    ) -> Result<Payload, WorkflowError> {
        if self.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }

        let activity = self
            .registry
            .activity(activity_type)
            .ok_or_else(|| ActivityError::not_registered(activity_type))?;

        let seq = self.next_seq();
        let timeout = options.start_to_close_timeout;
        self.record(HistoryEvent::ActivityScheduled {
            seq,
            activity_type: activity_type.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })
        .await?;

        let mut attempt = 1;
        loop {
            let attempt_token = self.cancel.token().child_token();
            let ctx = ActivityContext::new(activity_type, attempt, timeout, attempt_token.clone());

            debug!(
                seq,
                attempt,
                timeout_ms = timeout.as_millis() as u64,
                "Activity attempt started"
            );
            let result = tokio::select! {
                biased;
                _ = self.cancel.token().cancelled() => Err(ActivityError::cancelled(activity_type)),
                outcome = tokio::time::timeout(timeout, activity.execute(ctx, input.clone())) => {
                    match outcome {
                        Ok(result) => result,
                        Err(_) => Err(ActivityError::timed_out(activity_type, timeout)),
                    }
                }
            };
            // Abandoned attempts must observe cancellation if they kept a clone.
            attempt_token.cancel();

            match result {
                Ok(output) => {
                    self.record(HistoryEvent::ActivityCompleted {
                        seq,
                        attempt,
                        result: output.clone(),
                    })
                    .await?;
                    return Ok(output);
                }
                Err(err) if err.kind == ActivityErrorKind::Cancelled || self.is_cancelled() => {
                    debug!(seq, attempt, "Activity attempt cancelled");
                    return Err(WorkflowError::Cancelled);
                }
                Err(err) if err.is_retryable() && attempt < options.retry.max_attempts => {
                    let delay = options.retry.delay_after(attempt);
                    warn!(
                        seq,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Activity attempt failed, retrying"
                    );
                    tokio::select! {
                        _ = self.cancel.token().cancelled() => return Err(WorkflowError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(err) => {
                    self.record(HistoryEvent::ActivityFailed {
                        seq,
                        attempt,
                        message: err.message.clone(),
                    })
                    .await?;
                    return Err(WorkflowError::Activity(err));
                }
            }
        }
    }

    /// Durable timer: pause the run for `duration`.
    pub async fn sleep(&mut self, duration: Duration) -> Result<(), WorkflowError> {
        let seq = self.next_seq();
        self.record(HistoryEvent::TimerStarted {
            seq,
            duration_ms: duration.as_millis() as u64,
        })
        .await?;

        tokio::select! {
            _ = self.cancel.token().cancelled() => return Err(WorkflowError::Cancelled),
            _ = tokio::time::sleep(duration) => {}
        }

        self.record(HistoryEvent::TimerFired { seq }).await
    }
}

impl std::fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("workflow_id", &self.workflow_id)
            .field("run_id", &self.run_id)
            .field("workflow_type", &self.workflow_type)
            .field("history_length", &self.history_length)
            .field("continue_as_new_suggested", &self.continue_as_new_suggested)
            .finish()
    }
}
