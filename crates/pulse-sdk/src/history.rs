// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! History events recorded for every run.
//!
//! Each event is sent to the orchestrator as a JSON document. The orchestrator
//! counts events and bytes per run and answers with a continue-as-new
//! suggestion once either limit is reached.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Payload, RunId};

/// One entry of a run's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    RunStarted {
        input: Payload,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        continued_from: Option<RunId>,
    },
    ActivityScheduled {
        seq: u64,
        activity_type: String,
        timeout_ms: u64,
    },
    ActivityCompleted {
        seq: u64,
        attempt: u32,
        result: Payload,
    },
    ActivityFailed {
        seq: u64,
        attempt: u32,
        message: String,
    },
    TimerStarted {
        seq: u64,
        duration_ms: u64,
    },
    TimerFired {
        seq: u64,
    },
}

impl HistoryEvent {
    /// Wire encoding of this event.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn is_activity_completion(&self) -> bool {
        matches!(self, HistoryEvent::ActivityCompleted { .. })
    }
}
