// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Activities: the side-effecting steps a workflow schedules.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ActivityError;
use crate::types::Payload;

/// A named unit of side-effecting work.
///
/// Implementations must be safe to run more than once for the same input:
/// an attempt may be retried or re-dispatched after a worker restart.
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    async fn execute(&self, ctx: ActivityContext, input: Payload) -> Result<Payload, ActivityError>;
}

/// Per-attempt information handed to an activity.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    activity_type: String,
    attempt: u32,
    deadline: Instant,
    cancel: CancellationToken,
}

impl ActivityContext {
    pub(crate) fn new(
        activity_type: &str,
        attempt: u32,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            activity_type: activity_type.to_string(),
            attempt,
            deadline: Instant::now() + timeout,
            cancel,
        }
    }

    pub fn activity_type(&self) -> &str {
        &self.activity_type
    }

    /// 1-based attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Point after which this attempt counts as timed out.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the attempt is cancelled or abandoned.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Sleep for `duration`, returning early with a cancellation error.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ActivityError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ActivityError::cancelled(&self.activity_type)),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
