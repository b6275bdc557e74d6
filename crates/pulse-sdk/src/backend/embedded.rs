// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embedded in-process orchestrator.
//!
//! Keeps workflows, runs and their histories in memory and schedules runs onto
//! workers polling the same task queue. Continue-as-new closes the current run
//! and enqueues a fresh one under the same workflow id, so a chain of runs is
//! observable through [`EmbeddedOrchestrator::describe`]. Only the most recent
//! runs of a chain are retained, so an endless loop stays bounded in memory.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument};

use super::OrchestratorBackend;
use crate::error::{Result, SdkError};
use crate::history::HistoryEvent;
use crate::types::{
    EventAck, HistoryLimits, Payload, RunId, RunOutcome, RunStatus, TaskQueue,
    WorkerRegistration, WorkflowId, WorkflowTask,
};

/// Runs of one workflow kept in memory, newest last.
pub const DEFAULT_RETAINED_RUNS: usize = 16;

/// A history event with the time the orchestrator stored it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub recorded_at: DateTime<Utc>,
    pub event: HistoryEvent,
}

/// Snapshot of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: RunId,
    pub status: RunStatus,
    pub history_length: u64,
    pub history_bytes: u64,
    pub continued_from: Option<RunId>,
    pub outcome: Option<RunOutcome>,
}

/// Snapshot of a workflow and its chain of runs, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowDescription {
    pub workflow_id: WorkflowId,
    pub workflow_type: String,
    pub task_queue: TaskQueue,
    pub runs: Vec<RunSummary>,
}

impl WorkflowDescription {
    /// The newest run of the chain.
    pub fn current_run(&self) -> Option<&RunSummary> {
        self.runs.last()
    }

    pub fn status(&self) -> Option<RunStatus> {
        self.current_run().map(|run| run.status)
    }
}

/// Final result of a workflow after following its continue-as-new chain.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowResult {
    Completed(Payload),
    Failed(String),
    Cancelled,
}

struct WorkflowRecord {
    workflow_type: String,
    task_queue: TaskQueue,
    runs: Vec<RunId>,
}

struct RunRecord {
    workflow_id: WorkflowId,
    input: Payload,
    status: RunStatus,
    history: Vec<RecordedEvent>,
    history_bytes: u64,
    continued_from: Option<RunId>,
    outcome: Option<RunOutcome>,
    cancel_requested: bool,
}

impl RunRecord {
    fn scheduled(workflow_id: WorkflowId, input: Payload, continued_from: Option<RunId>) -> Self {
        Self {
            workflow_id,
            input,
            status: RunStatus::Scheduled,
            history: Vec::new(),
            history_bytes: 0,
            continued_from,
            outcome: None,
            cancel_requested: false,
        }
    }

    fn summary(&self, run_id: &RunId) -> RunSummary {
        RunSummary {
            run_id: run_id.clone(),
            status: self.status,
            history_length: self.history.len() as u64,
            history_bytes: self.history_bytes,
            continued_from: self.continued_from.clone(),
            outcome: self.outcome.clone(),
        }
    }
}

#[derive(Default)]
struct State {
    limits: HistoryLimits,
    retained_runs: usize,
    next_worker: u64,
    workers: HashMap<String, WorkerRegistration>,
    queues: HashMap<TaskQueue, VecDeque<RunId>>,
    workflows: HashMap<WorkflowId, WorkflowRecord>,
    runs: HashMap<RunId, RunRecord>,
}

impl State {
    fn current_run(&self, workflow_id: &WorkflowId) -> Option<(&RunId, &RunRecord)> {
        let run_id = self.workflows.get(workflow_id)?.runs.last()?;
        self.runs.get(run_id).map(|run| (run_id, run))
    }

    fn run_mut(&mut self, run_id: &RunId) -> Result<&mut RunRecord> {
        self.runs
            .get_mut(run_id)
            .ok_or_else(|| SdkError::UnknownRun(run_id.to_string()))
    }

    fn enqueue(
        &mut self,
        task_queue: &TaskQueue,
        workflow_id: &WorkflowId,
        run: RunRecord,
    ) -> RunId {
        let run_id = RunId::generate();
        self.runs.insert(run_id.clone(), run);
        if let Some(workflow) = self.workflows.get_mut(workflow_id) {
            workflow.runs.push(run_id.clone());
            // The closed run that led here and the new one always stay.
            let excess = workflow.runs.len().saturating_sub(self.retained_runs.max(2));
            for evicted in workflow.runs.drain(..excess) {
                self.runs.remove(&evicted);
            }
        }
        self.queues
            .entry(task_queue.clone())
            .or_default()
            .push_back(run_id.clone());
        run_id
    }

    fn take_task(&mut self, task_queue: &TaskQueue) -> Option<WorkflowTask> {
        let limits = self.limits;
        while let Some(run_id) = self.queues.get_mut(task_queue)?.pop_front() {
            let Some(run) = self.runs.get_mut(&run_id) else {
                continue;
            };
            if run.status != RunStatus::Scheduled {
                continue;
            }
            run.status = RunStatus::Running;
            let workflow_type = self
                .workflows
                .get(&run.workflow_id)
                .map(|w| w.workflow_type.clone())
                .unwrap_or_default();
            return Some(WorkflowTask {
                workflow_id: run.workflow_id.clone(),
                run_id,
                workflow_type,
                input: run.input.clone(),
                limits,
                continued_from: run.continued_from.clone(),
            });
        }
        None
    }
}

/// In-process orchestrator implementing [`OrchestratorBackend`].
pub struct EmbeddedOrchestrator {
    state: Mutex<State>,
    changes: watch::Sender<u64>,
}

impl Default for EmbeddedOrchestrator {
    fn default() -> Self {
        Self::new(HistoryLimits::default())
    }
}

impl EmbeddedOrchestrator {
    pub fn new(limits: HistoryLimits) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            state: Mutex::new(State {
                limits,
                retained_runs: DEFAULT_RETAINED_RUNS,
                ..Default::default()
            }),
            changes,
        }
    }

    /// Keep at most `runs` runs per workflow (at least two).
    pub fn with_retained_runs(mut self, runs: usize) -> Self {
        self.state.get_mut().retained_runs = runs.max(2);
        self
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version += 1);
    }

    /// Replace the history limits. Applies from the next recorded event on.
    pub async fn set_history_limits(&self, limits: HistoryLimits) {
        self.state.lock().await.limits = limits;
    }

    /// Schedule the first run of a workflow.
    #[instrument(skip(self, input), fields(workflow_id = %workflow_id))]
    pub async fn start_workflow(
        &self,
        task_queue: &TaskQueue,
        workflow_type: &str,
        workflow_id: WorkflowId,
        input: Payload,
    ) -> Result<RunId> {
        let mut state = self.state.lock().await;
        if let Some((_, run)) = state.current_run(&workflow_id)
            && !run.status.is_terminal()
        {
            return Err(SdkError::AlreadyStarted(workflow_id.to_string()));
        }

        state
            .workflows
            .entry(workflow_id.clone())
            .or_insert_with(|| WorkflowRecord {
                workflow_type: workflow_type.to_string(),
                task_queue: task_queue.clone(),
                runs: Vec::new(),
            });
        let run = RunRecord::scheduled(workflow_id.clone(), input, None);
        let run_id = state.enqueue(task_queue, &workflow_id, run);
        drop(state);

        info!(run_id = %run_id, workflow_type, "Workflow started");
        self.notify();
        Ok(run_id)
    }

    /// Request cancellation of the workflow's current run.
    ///
    /// A run no worker has picked up yet is cancelled immediately; a running
    /// one learns about it on its next heartbeat or recorded event.
    #[instrument(skip(self), fields(workflow_id = %workflow_id))]
    pub async fn cancel_workflow(&self, workflow_id: &WorkflowId) -> Result<()> {
        let mut state = self.state.lock().await;
        let run_id = state
            .current_run(workflow_id)
            .map(|(run_id, _)| run_id.clone())
            .ok_or_else(|| SdkError::UnknownWorkflow(workflow_id.to_string()))?;

        let run = state.run_mut(&run_id)?;
        match run.status {
            RunStatus::Scheduled => {
                run.status = RunStatus::Cancelled;
                run.outcome = Some(RunOutcome::Cancelled);
            }
            RunStatus::Running => run.cancel_requested = true,
            _ => return Ok(()),
        }
        drop(state);

        info!(run_id = %run_id, "Cancellation requested");
        self.notify();
        Ok(())
    }

    pub async fn describe(&self, workflow_id: &WorkflowId) -> Option<WorkflowDescription> {
        let state = self.state.lock().await;
        let workflow = state.workflows.get(workflow_id)?;
        let runs = workflow
            .runs
            .iter()
            .filter_map(|run_id| state.runs.get(run_id).map(|run| run.summary(run_id)))
            .collect();
        Some(WorkflowDescription {
            workflow_id: workflow_id.clone(),
            workflow_type: workflow.workflow_type.clone(),
            task_queue: workflow.task_queue.clone(),
            runs,
        })
    }

    /// Events recorded by one run, in order.
    pub async fn history(&self, run_id: &RunId) -> Option<Vec<RecordedEvent>> {
        let state = self.state.lock().await;
        state.runs.get(run_id).map(|run| run.history.clone())
    }

    /// Registrations received so far.
    pub async fn registered_workers(&self) -> Vec<WorkerRegistration> {
        self.state.lock().await.workers.values().cloned().collect()
    }

    /// Wait until the workflow's chain ends, following continue-as-new.
    pub async fn wait_for_result(&self, workflow_id: &WorkflowId) -> Result<WorkflowResult> {
        let mut changes = self.changes.subscribe();
        loop {
            {
                let state = self.state.lock().await;
                let (_, run) = state
                    .current_run(workflow_id)
                    .ok_or_else(|| SdkError::UnknownWorkflow(workflow_id.to_string()))?;
                match &run.outcome {
                    Some(RunOutcome::Completed(value)) => {
                        return Ok(WorkflowResult::Completed(value.clone()));
                    }
                    Some(RunOutcome::Failed(message)) => {
                        return Ok(WorkflowResult::Failed(message.clone()));
                    }
                    Some(RunOutcome::Cancelled) => return Ok(WorkflowResult::Cancelled),
                    Some(RunOutcome::ContinuedAsNew(_)) | None => {}
                }
            }
            if changes.changed().await.is_err() {
                return Err(SdkError::UnknownWorkflow(workflow_id.to_string()));
            }
        }
    }
}

#[async_trait]
impl OrchestratorBackend for EmbeddedOrchestrator {
    async fn connect(&self) -> Result<()> {
        debug!("Embedded orchestrator: connect is a no-op");
        Ok(())
    }

    async fn close(&self) {
        debug!("Embedded orchestrator: close is a no-op");
    }

    #[instrument(skip(self, registration), fields(task_queue = %registration.task_queue))]
    async fn register_worker(&self, registration: &WorkerRegistration) -> Result<String> {
        let mut state = self.state.lock().await;
        state.next_worker += 1;
        let worker_id = format!("embedded-worker-{}", state.next_worker);
        state
            .workers
            .insert(worker_id.clone(), registration.clone());

        info!(
            worker_id = %worker_id,
            workflow_types = ?registration.workflow_types,
            activity_types = ?registration.activity_types,
            "Worker registered"
        );
        Ok(worker_id)
    }

    async fn poll_workflow_task(
        &self,
        worker_id: &str,
        task_queue: &TaskQueue,
        wait: Duration,
    ) -> Result<Option<WorkflowTask>> {
        let mut changes = self.changes.subscribe();
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            {
                let mut state = self.state.lock().await;
                if !state.workers.contains_key(worker_id) {
                    return Err(SdkError::Registration(format!(
                        "unknown worker id {worker_id}"
                    )));
                }
                if let Some(task) = state.take_task(task_queue) {
                    debug!(worker_id, run_id = %task.run_id, "Dispatched workflow task");
                    return Ok(Some(task));
                }
            }
            match tokio::time::timeout_at(deadline, changes.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => return Ok(None),
            }
        }
    }

    async fn record_event(&self, run_id: &RunId, event: &HistoryEvent) -> Result<EventAck> {
        let encoded = event.encode()?;
        let mut state = self.state.lock().await;
        let limits = state.limits;
        let run = state.run_mut(run_id)?;
        if run.status != RunStatus::Running {
            return Err(SdkError::Server {
                code: "RUN_CLOSED".to_string(),
                message: format!("run {run_id} is {}", run.status),
            });
        }

        run.history.push(RecordedEvent {
            recorded_at: Utc::now(),
            event: event.clone(),
        });
        run.history_bytes += encoded.len() as u64;

        Ok(EventAck {
            continue_as_new_suggested: limits.exceeded(run.history.len() as u64, run.history_bytes),
            cancel_requested: run.cancel_requested,
        })
    }

    async fn heartbeat(&self, run_id: &RunId) -> Result<bool> {
        let mut state = self.state.lock().await;
        Ok(state.run_mut(run_id)?.cancel_requested)
    }

    #[instrument(skip(self, outcome), fields(run_id = %run_id, status = %outcome.status()))]
    async fn complete_run(&self, run_id: &RunId, outcome: &RunOutcome) -> Result<Option<RunId>> {
        let mut state = self.state.lock().await;
        let run = state.run_mut(run_id)?;
        if run.status.is_terminal() {
            return Err(SdkError::Server {
                code: "RUN_CLOSED".to_string(),
                message: format!("run {run_id} is already {}", run.status),
            });
        }
        run.status = outcome.status();
        run.outcome = Some(outcome.clone());
        let workflow_id = run.workflow_id.clone();
        let cancel_requested = run.cancel_requested;

        let next_run_id = match outcome {
            RunOutcome::ContinuedAsNew(input) => {
                let task_queue = state
                    .workflows
                    .get(&workflow_id)
                    .map(|w| w.task_queue.clone())
                    .ok_or_else(|| SdkError::UnknownWorkflow(workflow_id.to_string()))?;
                let mut next = RunRecord::scheduled(
                    workflow_id.clone(),
                    input.clone(),
                    Some(run_id.clone()),
                );
                // A cancel aimed at the workflow follows it into the next run.
                next.cancel_requested = cancel_requested;
                let next_run_id = state.enqueue(&task_queue, &workflow_id, next);
                info!(next_run_id = %next_run_id, "Run continued as new");
                Some(next_run_id)
            }
            _ => {
                info!("Run closed");
                None
            }
        };
        drop(state);

        self.notify();
        Ok(next_run_id)
    }
}
