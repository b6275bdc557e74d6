// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The durable region loop.
//!
//! Each run samples the region strictly one iteration at a time. A run ends in
//! one of three ways: `DONE` once a fixed iteration budget is spent, `FAILED`
//! when a sample fails or times out, or `RESTARTING` when the orchestrator
//! suggests truncating history. A restart continues the same workflow as a new
//! run with a fresh counter and no carried state.

use std::collections::VecDeque;

use async_trait::async_trait;
use pulse_sdk::{
    ActivityOptions, Payload, RunStatus, Workflow, WorkflowContext, WorkflowError, WorkflowExit,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::{LoopConfig, RestartPolicy};
use crate::sampler::REGION_ACTIVITY;

/// Workflow type name registered with the orchestrator.
pub const REGION_WORKFLOW: &str = "RegionWorkflow";

/// Controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopState {
    Running,
    Restarting,
    Failed,
    Done,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoopState::Failed | LoopState::Done)
    }

    /// Controller state matching a run status reported by the orchestrator.
    ///
    /// Cancelled and not-yet-started runs have no controller state.
    pub fn from_run_status(status: RunStatus) -> Option<Self> {
        match status {
            RunStatus::Running => Some(LoopState::Running),
            RunStatus::ContinuedAsNew => Some(LoopState::Restarting),
            RunStatus::Failed => Some(LoopState::Failed),
            RunStatus::Completed => Some(LoopState::Done),
            RunStatus::Scheduled | RunStatus::Cancelled => None,
        }
    }
}

/// Result of a run that reached `DONE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopSummary {
    pub iterations: u32,
    pub last_value: Option<String>,
    /// Most recent samples, oldest first
    pub recent: Vec<String>,
}

/// What the loop does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Restart,
    Done,
}

/// Per-run loop state. Never outlives the run that created it.
#[derive(Debug)]
pub struct RegionLoop {
    iteration: u32,
    last_value: Option<String>,
    recent: VecDeque<String>,
    window: usize,
    state: LoopState,
}

impl RegionLoop {
    pub fn new(window: usize) -> Self {
        Self {
            iteration: 0,
            last_value: None,
            recent: VecDeque::with_capacity(window),
            window,
            state: LoopState::Running,
        }
    }

    /// Successful iterations so far.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn last_value(&self) -> Option<&str> {
        self.last_value.as_deref()
    }

    pub fn recent(&self) -> impl Iterator<Item = &str> {
        self.recent.iter().map(String::as_str)
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Record a successful sample.
    pub fn record(&mut self, value: String) {
        self.iteration += 1;
        if self.window > 0 {
            if self.recent.len() == self.window {
                self.recent.pop_front();
            }
            self.recent.push_back(value.clone());
        }
        self.last_value = Some(value);
    }

    /// Decide between another iteration, a restart and finishing.
    ///
    /// A spent budget wins over a restart suggestion. A suggestion is only
    /// honored once the run has made progress, so a history already over the
    /// limit at start cannot restart forever.
    pub fn next_step(&self, policy: RestartPolicy, restart_suggested: bool) -> Step {
        if let RestartPolicy::FixedCount(budget) = policy
            && self.iteration >= budget
        {
            return Step::Done;
        }
        if restart_suggested && self.iteration > 0 {
            return Step::Restart;
        }
        Step::Continue
    }

    fn transition(&mut self, to: LoopState) {
        debug!(from = ?self.state, to = ?to, iteration = self.iteration, "Loop state change");
        self.state = to;
    }

    pub fn summary(&self) -> LoopSummary {
        LoopSummary {
            iterations: self.iteration,
            last_value: self.last_value.clone(),
            recent: self.recent.iter().cloned().collect(),
        }
    }
}

/// The region-sampling workflow.
#[derive(Debug, Clone)]
pub struct RegionWorkflow {
    config: LoopConfig,
}

impl RegionWorkflow {
    pub fn new(config: LoopConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    fn finish(
        &self,
        run: &mut RegionLoop,
        step: Step,
    ) -> Result<Option<WorkflowExit>, WorkflowError> {
        match step {
            Step::Continue => Ok(None),
            Step::Done => {
                run.transition(LoopState::Done);
                info!(
                    iterations = run.iteration(),
                    last_value = ?run.last_value(),
                    "Iteration budget spent, region loop done"
                );
                Ok(Some(WorkflowExit::Completed(serde_json::to_value(
                    run.summary(),
                )?)))
            }
            Step::Restart => {
                run.transition(LoopState::Restarting);
                info!(
                    iterations = run.iteration(),
                    "History limit reached, continuing as new"
                );
                Ok(Some(WorkflowExit::ContinueAsNew(Payload::Null)))
            }
        }
    }
}

#[async_trait]
impl Workflow for RegionWorkflow {
    async fn run(
        &self,
        ctx: &mut WorkflowContext,
        _input: Payload,
    ) -> Result<WorkflowExit, WorkflowError> {
        let policy = self.config.restart_policy;
        let options = ActivityOptions::with_timeout(self.config.activity_timeout);
        let mut run = RegionLoop::new(self.config.recent_window);

        info!(
            workflow_id = %ctx.workflow_id(),
            run_id = %ctx.run_id(),
            continued_from = ?ctx.continued_from(),
            policy = ?policy,
            timeout_ms = self.config.activity_timeout.as_millis() as u64,
            "Region loop started"
        );

        loop {
            let step = run.next_step(policy, ctx.continue_as_new_suggested());
            if let Some(exit) = self.finish(&mut run, step)? {
                return Ok(exit);
            }

            if run.iteration() > 0
                && let Some(pause) = self.config.inter_iteration_pause
            {
                ctx.sleep(pause).await?;
                // The pause itself may push history over the limit.
                if run.next_step(policy, ctx.continue_as_new_suggested()) != Step::Continue {
                    continue;
                }
            }

            let iteration = run.iteration() + 1;
            let sampled = ctx
                .execute_activity(REGION_ACTIVITY, Payload::Null, &options)
                .await
                .and_then(|value| serde_json::from_value::<String>(value).map_err(Into::into));

            match sampled {
                Ok(value) => {
                    info!(iteration, region = %value, "Region sampled");
                    run.record(value);
                }
                Err(WorkflowError::Cancelled) => {
                    info!(iteration, "Region loop cancelled");
                    return Err(WorkflowError::Cancelled);
                }
                Err(e) => {
                    run.transition(LoopState::Failed);
                    error!(iteration, error = %e, "Region sampling failed");
                    return Err(e);
                }
            }
        }
    }
}
