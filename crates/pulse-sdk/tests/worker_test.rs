// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker and invocation-boundary tests against the embedded orchestrator.
//!
//! Run with:
//! ```bash
//! cargo test -p pulse-sdk --test worker_test
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use pulse_sdk::{
    Activity, ActivityContext, ActivityError, ActivityOptions, EmbeddedOrchestrator, HistoryEvent,
    HistoryLimits, OrchestratorBackend, Payload, Registry, RetryConfig, RunCancellation,
    RunOutcome, RunStatus, TaskQueue, Worker, Workflow, WorkflowContext, WorkflowError,
    WorkflowExit, WorkflowId, WorkflowResult, async_trait,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

const QUEUE: &str = "sdk-test";

/// Fails the first `failures` calls, then echoes its input.
struct Flaky {
    calls: Arc<AtomicU32>,
    failures: u32,
}

#[async_trait]
impl Activity for Flaky {
    async fn execute(
        &self,
        _ctx: ActivityContext,
        input: Payload,
    ) -> Result<Payload, ActivityError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(ActivityError::failed("Flaky", format!("failure #{call}")));
        }
        Ok(input)
    }
}

/// Sleeps for a long time, honoring cancellation.
struct Slow;

#[async_trait]
impl Activity for Slow {
    async fn execute(
        &self,
        ctx: ActivityContext,
        input: Payload,
    ) -> Result<Payload, ActivityError> {
        ctx.sleep(Duration::from_secs(60)).await?;
        Ok(input)
    }
}

/// Calls one activity with the given options and completes with its output.
struct CallOnce {
    activity: &'static str,
    options: ActivityOptions,
}

#[async_trait]
impl Workflow for CallOnce {
    async fn run(
        &self,
        ctx: &mut WorkflowContext,
        input: Payload,
    ) -> Result<WorkflowExit, WorkflowError> {
        let output = ctx.execute_activity(self.activity, input, &self.options).await?;
        Ok(WorkflowExit::Completed(output))
    }
}

fn registry(workflow: CallOnce, calls: Arc<AtomicU32>, failures: u32) -> Registry {
    let mut registry = Registry::new();
    registry
        .register_activity("Flaky", Flaky { calls, failures })
        .unwrap()
        .register_activity("Slow", Slow)
        .unwrap()
        .register_workflow("CallOnce", workflow)
        .unwrap();
    registry
}

async fn start_and_take(
    orchestrator: &Arc<EmbeddedOrchestrator>,
    worker: &Worker,
    id: &str,
) -> pulse_sdk::WorkflowTask {
    let worker_id = orchestrator
        .register_worker(&worker.registration())
        .await
        .unwrap();
    orchestrator
        .start_workflow(
            worker.task_queue(),
            "CallOnce",
            WorkflowId::new(id),
            json!("payload"),
        )
        .await
        .unwrap();
    orchestrator
        .poll_workflow_task(&worker_id, worker.task_queue(), Duration::ZERO)
        .await
        .unwrap()
        .expect("task should be scheduled")
}

#[tokio::test]
async fn test_activity_result_completes_run() {
    let orchestrator = Arc::new(EmbeddedOrchestrator::default());
    let calls = Arc::new(AtomicU32::new(0));
    let workflow = CallOnce {
        activity: "Flaky",
        options: ActivityOptions::with_timeout(Duration::from_secs(2)),
    };
    let worker = Worker::new(
        orchestrator.clone(),
        registry(workflow, calls.clone(), 0),
        TaskQueue::new(QUEUE),
    );

    let task = start_and_take(&orchestrator, &worker, "wf-ok").await;
    let run_id = task.run_id.clone();
    let outcome = worker
        .execute_task(task, RunCancellation::new(&CancellationToken::new()))
        .await;

    assert_eq!(outcome, Some(RunOutcome::Completed(json!("payload"))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let history = orchestrator.history(&run_id).await.unwrap();
    let kinds: Vec<_> = history.iter().map(|r| &r.event).collect();
    assert!(matches!(kinds[0], HistoryEvent::RunStarted { .. }));
    assert!(matches!(kinds[1], HistoryEvent::ActivityScheduled { seq: 1, .. }));
    assert!(matches!(
        kinds[2],
        HistoryEvent::ActivityCompleted { seq: 1, attempt: 1, .. }
    ));
}

#[tokio::test]
async fn test_failure_without_retry_preserves_message() {
    let orchestrator = Arc::new(EmbeddedOrchestrator::default());
    let calls = Arc::new(AtomicU32::new(0));
    let workflow = CallOnce {
        activity: "Flaky",
        options: ActivityOptions::with_timeout(Duration::from_secs(2)),
    };
    let worker = Worker::new(
        orchestrator.clone(),
        registry(workflow, calls.clone(), 5),
        TaskQueue::new(QUEUE),
    );

    let task = start_and_take(&orchestrator, &worker, "wf-fail").await;
    let outcome = worker
        .execute_task(task, RunCancellation::new(&CancellationToken::new()))
        .await;

    assert_eq!(outcome, Some(RunOutcome::Failed("failure #1".to_string())));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        orchestrator
            .wait_for_result(&WorkflowId::new("wf-fail"))
            .await
            .unwrap(),
        WorkflowResult::Failed("failure #1".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_retry_policy_reattempts_failed_activity() {
    let orchestrator = Arc::new(EmbeddedOrchestrator::default());
    let calls = Arc::new(AtomicU32::new(0));
    let workflow = CallOnce {
        activity: "Flaky",
        options: ActivityOptions::with_timeout(Duration::from_secs(2)).retry(RetryConfig {
            max_attempts: 3,
            initial_interval: Duration::from_millis(100),
            backoff: 2.0,
        }),
    };
    let worker = Worker::new(
        orchestrator.clone(),
        registry(workflow, calls.clone(), 2),
        TaskQueue::new(QUEUE),
    );

    let task = start_and_take(&orchestrator, &worker, "wf-retry").await;
    let run_id = task.run_id.clone();
    let outcome = worker
        .execute_task(task, RunCancellation::new(&CancellationToken::new()))
        .await;

    assert_eq!(outcome, Some(RunOutcome::Completed(json!("payload"))));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let history = orchestrator.history(&run_id).await.unwrap();
    assert!(history.iter().any(|r| matches!(
        r.event,
        HistoryEvent::ActivityCompleted { attempt: 3, .. }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_fails_like_an_error() {
    let orchestrator = Arc::new(EmbeddedOrchestrator::default());
    let workflow = CallOnce {
        activity: "Slow",
        options: ActivityOptions::with_timeout(Duration::from_secs(2)),
    };
    let worker = Worker::new(
        orchestrator.clone(),
        registry(workflow, Arc::new(AtomicU32::new(0)), 0),
        TaskQueue::new(QUEUE),
    );

    let task = start_and_take(&orchestrator, &worker, "wf-timeout").await;
    let run_id = task.run_id.clone();
    let outcome = worker
        .execute_task(task, RunCancellation::new(&CancellationToken::new()))
        .await;

    assert_eq!(
        outcome,
        Some(RunOutcome::Failed(
            "activity Slow timed out after 2000ms".to_string()
        ))
    );
    let history = orchestrator.history(&run_id).await.unwrap();
    assert!(matches!(
        history.last().map(|r| &r.event),
        Some(HistoryEvent::ActivityFailed { .. })
    ));
}

#[tokio::test]
async fn test_unregistered_activity_fails_run() {
    let orchestrator = Arc::new(EmbeddedOrchestrator::default());
    let workflow = CallOnce {
        activity: "Missing",
        options: ActivityOptions::with_timeout(Duration::from_secs(2)),
    };
    let worker = Worker::new(
        orchestrator.clone(),
        registry(workflow, Arc::new(AtomicU32::new(0)), 0),
        TaskQueue::new(QUEUE),
    );

    let task = start_and_take(&orchestrator, &worker, "wf-missing").await;
    let outcome = worker
        .execute_task(task, RunCancellation::new(&CancellationToken::new()))
        .await;

    assert_eq!(
        outcome,
        Some(RunOutcome::Failed(
            "activity type 'Missing' is not registered".to_string()
        ))
    );
}

#[tokio::test]
async fn test_orchestrator_cancel_interrupts_slow_activity() {
    let orchestrator = Arc::new(EmbeddedOrchestrator::default());
    let workflow = CallOnce {
        activity: "Slow",
        options: ActivityOptions::with_timeout(Duration::from_secs(120)),
    };
    let worker = Worker::new(
        orchestrator.clone(),
        registry(workflow, Arc::new(AtomicU32::new(0)), 0),
        TaskQueue::new(QUEUE),
    )
    .with_poll_wait(Duration::from_millis(50))
    .with_heartbeat_interval(Duration::from_millis(20));

    let id = WorkflowId::new("wf-cancel");
    orchestrator
        .start_workflow(&TaskQueue::new(QUEUE), "CallOnce", id.clone(), json!(1))
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    let serving = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { worker.run(shutdown.cancelled_owned()).await }
    });

    // Wait until the run is picked up, then cancel it.
    loop {
        let status = orchestrator.describe(&id).await.and_then(|d| d.status());
        if status == Some(RunStatus::Running) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    orchestrator.cancel_workflow(&id).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), orchestrator.wait_for_result(&id))
        .await
        .expect("cancellation should be observed well before the activity finishes")
        .unwrap();
    assert_eq!(result, WorkflowResult::Cancelled);

    shutdown.cancel();
    serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_abandons_runs_after_grace() {
    let orchestrator = Arc::new(EmbeddedOrchestrator::default());
    let workflow = CallOnce {
        activity: "Slow",
        options: ActivityOptions::with_timeout(Duration::from_secs(120)),
    };
    let worker = Worker::new(
        orchestrator.clone(),
        registry(workflow, Arc::new(AtomicU32::new(0)), 0),
        TaskQueue::new(QUEUE),
    )
    .with_poll_wait(Duration::from_millis(50))
    .with_heartbeat_interval(Duration::ZERO)
    .with_shutdown_grace(Duration::from_millis(50));

    let id = WorkflowId::new("wf-shutdown");
    orchestrator
        .start_workflow(&TaskQueue::new(QUEUE), "CallOnce", id.clone(), json!(1))
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    let serving = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { worker.run(shutdown.cancelled_owned()).await }
    });

    loop {
        let status = orchestrator.describe(&id).await.and_then(|d| d.status());
        if status == Some(RunStatus::Running) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .expect("worker should stop after the grace period")
        .unwrap()
        .unwrap();

    // A local shutdown is not a workflow cancellation: nothing is reported.
    let description = orchestrator.describe(&id).await.unwrap();
    assert_eq!(description.status(), Some(RunStatus::Running));
    assert_eq!(description.current_run().unwrap().outcome, None);
}

/// Completes with the history length at which continue-as-new was first suggested.
struct HintWatcher;

#[async_trait]
impl Workflow for HintWatcher {
    async fn run(
        &self,
        ctx: &mut WorkflowContext,
        _input: Payload,
    ) -> Result<WorkflowExit, WorkflowError> {
        let mut suggested_after = None;
        for _ in 0..4 {
            ctx.sleep(Duration::from_millis(1)).await?;
            if ctx.continue_as_new_suggested() && suggested_after.is_none() {
                suggested_after = Some(ctx.history_length());
            }
        }
        Ok(WorkflowExit::Completed(json!(suggested_after)))
    }
}

#[tokio::test]
async fn test_history_limit_sets_continue_as_new_hint() {
    let orchestrator = Arc::new(EmbeddedOrchestrator::new(HistoryLimits {
        max_events: 5,
        max_bytes: u64::MAX,
    }));
    let mut registry = Registry::new();
    registry.register_workflow("CallOnce", HintWatcher).unwrap();
    let worker = Worker::new(orchestrator.clone(), registry, TaskQueue::new(QUEUE));

    let task = start_and_take(&orchestrator, &worker, "wf-hint").await;
    let outcome = worker
        .execute_task(task, RunCancellation::new(&CancellationToken::new()))
        .await;

    // RunStarted + two timers (started, fired) = 5 events.
    assert_eq!(outcome, Some(RunOutcome::Completed(json!(5))));
}

#[tokio::test]
async fn test_dispatched_limits_set_hint_without_orchestrator() {
    let orchestrator = Arc::new(EmbeddedOrchestrator::default());
    let mut registry = Registry::new();
    registry.register_workflow("CallOnce", HintWatcher).unwrap();
    let worker = Worker::new(orchestrator.clone(), registry, TaskQueue::new(QUEUE));

    let mut task = start_and_take(&orchestrator, &worker, "wf-local-limit").await;
    task.limits = HistoryLimits {
        max_events: 3,
        max_bytes: u64::MAX,
    };
    let outcome = worker
        .execute_task(task, RunCancellation::new(&CancellationToken::new()))
        .await;

    // RunStarted + one timer (started, fired) = 3 events.
    assert_eq!(outcome, Some(RunOutcome::Completed(json!(3))));
}
