// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker serving loop.
//!
//! The worker registers its task queue and types once, then long-polls for
//! workflow runs. Each run executes on its own task with its own cancellation
//! token and a heartbeat task that watches for orchestrator-side cancellation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, instrument, warn};

use crate::backend::OrchestratorBackend;
use crate::error::{Result, WorkflowError};
use crate::history::HistoryEvent;
use crate::registry::Registry;
use crate::types::{RunId, RunOutcome, TaskQueue, WorkerRegistration, WorkflowTask};
use crate::workflow::{RunCancellation, WorkflowContext, WorkflowExit};

/// Serves the workflows and activities of one [`Registry`] on one task queue.
pub struct Worker {
    backend: Arc<dyn OrchestratorBackend>,
    registry: Arc<Registry>,
    task_queue: TaskQueue,
    namespace: String,
    identity: String,
    poll_wait: Duration,
    poll_retry_delay: Duration,
    heartbeat_interval: Duration,
    shutdown_grace: Duration,
    max_concurrent_runs: usize,
}

impl Worker {
    pub fn new(
        backend: Arc<dyn OrchestratorBackend>,
        registry: Registry,
        task_queue: TaskQueue,
    ) -> Self {
        Self {
            backend,
            registry: Arc::new(registry),
            task_queue,
            namespace: "default".to_string(),
            identity: format!("pulse-worker@{}", std::process::id()),
            poll_wait: Duration::from_secs(30),
            poll_retry_delay: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(10),
            max_concurrent_runs: 64,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Long-poll budget per poll request.
    pub fn with_poll_wait(mut self, wait: Duration) -> Self {
        self.poll_wait = wait;
        self
    }

    /// Set the per-run heartbeat interval. Zero disables heartbeats.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// How long in-flight runs may keep going after shutdown is requested.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_max_concurrent_runs(mut self, max: usize) -> Self {
        self.max_concurrent_runs = max.max(1);
        self
    }

    pub fn task_queue(&self) -> &TaskQueue {
        &self.task_queue
    }

    /// The (task queue, workflow types, activity types) triple this worker serves.
    pub fn registration(&self) -> WorkerRegistration {
        WorkerRegistration {
            namespace: self.namespace.clone(),
            task_queue: self.task_queue.clone(),
            workflow_types: self.registry.workflow_types(),
            activity_types: self.registry.activity_types(),
            identity: self.identity.clone(),
        }
    }

    /// Register and serve until `shutdown` resolves.
    ///
    /// On shutdown, polling stops immediately. In-flight runs get the grace
    /// period to finish; whatever is still running afterwards is cancelled
    /// locally and left for the orchestrator to redeliver.
    #[instrument(skip_all, fields(task_queue = %self.task_queue))]
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        self.backend.connect().await?;
        let worker_id = match self.backend.register_worker(&self.registration()).await {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, "Registration failed");
                self.backend.close().await;
                return Err(e);
            }
        };
        info!(
            worker_id = %worker_id,
            workflow_types = ?self.registry.workflow_types(),
            activity_types = ?self.registry.activity_types(),
            "Worker serving"
        );

        let worker = Arc::new(self);
        let root = CancellationToken::new();
        let limiter = Arc::new(Semaphore::new(worker.max_concurrent_runs));
        let mut runs = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            let permit = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                permit = limiter.clone().acquire_owned() => permit,
            };
            let Ok(permit) = permit else { break };

            let polled = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                polled = worker.backend.poll_workflow_task(
                    &worker_id,
                    &worker.task_queue,
                    worker.poll_wait,
                ) => polled,
            };

            match polled {
                Ok(Some(task)) => {
                    let cancel = RunCancellation::new(&root);
                    let worker = worker.clone();
                    runs.spawn(async move {
                        let _permit = permit;
                        worker.execute_task(task, cancel).await;
                    });
                }
                Ok(None) => debug!("Poll returned no task"),
                Err(e) => {
                    warn!(error = %e, "Polling for workflow tasks failed");
                    tokio::select! {
                        biased;
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(worker.poll_retry_delay) => {}
                    }
                }
            }

            while let Some(joined) = runs.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "Workflow run task aborted");
                }
            }
        }

        info!(in_flight = runs.len(), "Shutdown requested, draining workflow runs");
        let drained = tokio::time::timeout(worker.shutdown_grace, async {
            while runs.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                in_flight = runs.len(),
                grace_ms = worker.shutdown_grace.as_millis() as u64,
                "Grace period elapsed, cancelling in-flight runs"
            );
            root.cancel();
            while let Some(joined) = runs.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Workflow run task aborted");
                }
            }
        }

        worker.backend.close().await;
        info!("Worker stopped");
        Ok(())
    }

    /// Execute one workflow task to its end and report the outcome.
    ///
    /// Returns the reported outcome, or `None` when the run was abandoned
    /// because the worker itself is shutting down.
    #[instrument(
        skip_all,
        fields(
            workflow_id = %task.workflow_id,
            run_id = %task.run_id,
            workflow_type = %task.workflow_type,
        )
    )]
    pub async fn execute_task(
        &self,
        task: WorkflowTask,
        cancel: RunCancellation,
    ) -> Option<RunOutcome> {
        let heartbeat_stop = CancellationToken::new();
        let heartbeat = self.spawn_heartbeat(&task.run_id, &cancel, &heartbeat_stop);

        let outcome = self.run_workflow(&task, &cancel).await;

        heartbeat_stop.cancel();
        if let Some(handle) = heartbeat {
            let _ = handle.await;
        }

        let Some(outcome) = outcome else {
            info!("Run abandoned on worker shutdown");
            return None;
        };

        match self.backend.complete_run(&task.run_id, &outcome).await {
            Ok(Some(next_run_id)) => {
                info!(next_run_id = %next_run_id, "Run continued as new");
            }
            Ok(None) => info!(status = %outcome.status(), "Run finished"),
            Err(e) => error!(error = %e, "Failed to report run outcome"),
        }
        Some(outcome)
    }

    async fn run_workflow(
        &self,
        task: &WorkflowTask,
        cancel: &RunCancellation,
    ) -> Option<RunOutcome> {
        let Some(workflow) = self.registry.workflow(&task.workflow_type) else {
            error!("Workflow type is not registered on this worker");
            return Some(RunOutcome::Failed(format!(
                "workflow type '{}' is not registered",
                task.workflow_type
            )));
        };

        let mut ctx = WorkflowContext::new(
            task,
            self.backend.clone(),
            self.registry.clone(),
            cancel.clone(),
        );

        let started = ctx
            .record(HistoryEvent::RunStarted {
                input: task.input.clone(),
                continued_from: task.continued_from.clone(),
            })
            .await;
        let result = match started {
            Ok(()) => workflow.run(&mut ctx, task.input.clone()).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(WorkflowExit::Completed(output)) => Some(RunOutcome::Completed(output)),
            Ok(WorkflowExit::ContinueAsNew(input)) => Some(RunOutcome::ContinuedAsNew(input)),
            Err(WorkflowError::Cancelled) if cancel.is_requested() => Some(RunOutcome::Cancelled),
            Err(WorkflowError::Cancelled) => None,
            Err(e) => {
                warn!(error = %e, "Run failed");
                Some(RunOutcome::Failed(e.to_string()))
            }
        }
    }

    fn spawn_heartbeat(
        &self,
        run_id: &RunId,
        cancel: &RunCancellation,
        stop: &CancellationToken,
    ) -> Option<JoinHandle<()>> {
        if self.heartbeat_interval.is_zero() {
            return None;
        }

        let backend = self.backend.clone();
        let interval = self.heartbeat_interval;
        let run_id = run_id.clone();
        let cancel = cancel.clone();
        let stop = stop.clone();

        let task = async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        match backend.heartbeat(&run_id).await {
                            Ok(true) => {
                                info!("Cancellation requested by orchestrator");
                                cancel.request();
                                break;
                            }
                            Ok(false) => debug!("Heartbeat sent"),
                            Err(e) => warn!(error = %e, "Failed to send heartbeat"),
                        }
                    }
                }
            }
        };
        Some(tokio::spawn(task.in_current_span()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::backend::embedded::EmbeddedOrchestrator;
    use crate::error::SdkError;
    use crate::types::EventAck;

    /// Connects fine, refuses registration, counts closes.
    #[derive(Default)]
    struct RefusingBackend {
        closes: AtomicUsize,
    }

    #[async_trait]
    impl OrchestratorBackend for RefusingBackend {
        async fn connect(&self) -> Result<()> {
            Ok(())
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }

        async fn register_worker(&self, _registration: &WorkerRegistration) -> Result<String> {
            Err(SdkError::Registration("task queue is reserved".to_string()))
        }

        async fn poll_workflow_task(
            &self,
            _worker_id: &str,
            _task_queue: &TaskQueue,
            _wait: Duration,
        ) -> Result<Option<WorkflowTask>> {
            Ok(None)
        }

        async fn record_event(&self, _run_id: &RunId, _event: &HistoryEvent) -> Result<EventAck> {
            Ok(EventAck::default())
        }

        async fn heartbeat(&self, _run_id: &RunId) -> Result<bool> {
            Ok(false)
        }

        async fn complete_run(
            &self,
            _run_id: &RunId,
            _outcome: &RunOutcome,
        ) -> Result<Option<RunId>> {
            Ok(None)
        }
    }

    #[test]
    fn test_registration_lists_registered_types() {
        let backend = Arc::new(EmbeddedOrchestrator::default());
        let worker = Worker::new(backend, Registry::new(), TaskQueue::new("q"))
            .with_namespace("acme")
            .with_identity("worker-1");

        let registration = worker.registration();
        assert_eq!(registration.namespace, "acme");
        assert_eq!(registration.task_queue, TaskQueue::new("q"));
        assert_eq!(registration.identity, "worker-1");
        assert!(registration.workflow_types.is_empty());
    }

    #[test]
    fn test_max_concurrent_runs_is_at_least_one() {
        let backend = Arc::new(EmbeddedOrchestrator::default());
        let worker = Worker::new(backend, Registry::new(), TaskQueue::new("q"))
            .with_max_concurrent_runs(0);
        assert_eq!(worker.max_concurrent_runs, 1);
    }

    #[tokio::test]
    async fn test_refused_registration_closes_backend() {
        let backend = Arc::new(RefusingBackend::default());
        let worker = Worker::new(backend.clone(), Registry::new(), TaskQueue::new("q"));

        let result = worker.run(std::future::pending()).await;

        assert!(matches!(result, Err(SdkError::Registration(_))));
        assert_eq!(backend.closes.load(Ordering::SeqCst), 1);
    }
}
