// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pulse SDK - worker library for durable workflows.
//!
//! A worker registers workflow and activity types on a task queue, receives
//! runs from an orchestrator and executes them. Workflows interact with the
//! outside world only through their [`WorkflowContext`], which records every
//! step as history and relays the orchestrator's continue-as-new hint.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use pulse_sdk::{EmbeddedOrchestrator, Registry, TaskQueue, Worker};
//!
//! let mut registry = Registry::new();
//! registry
//!     .register_activity("GetRegion", sampler)?
//!     .register_workflow("RegionWorkflow", controller)?;
//!
//! let backend = Arc::new(EmbeddedOrchestrator::default());
//! Worker::new(backend, registry, TaskQueue::new("mrn-test"))
//!     .run(tokio::signal::ctrl_c().map(|_| ()))
//!     .await?;
//! ```
//!
//! # Backends
//!
//! - [`QuicBackend`]: a remote orchestrator over QUIC with mutual TLS
//! - [`EmbeddedOrchestrator`]: in-process orchestrator for local runs and tests

mod activity;
pub mod backend;
mod error;
mod history;
mod registry;
mod types;
mod worker;
mod workflow;

pub use activity::{Activity, ActivityContext};
pub use backend::OrchestratorBackend;
pub use backend::embedded::{
    EmbeddedOrchestrator, RecordedEvent, RunSummary, WorkflowDescription, WorkflowResult,
};
pub use backend::quic::QuicBackend;
pub use error::{ActivityError, ActivityErrorKind, Result, SdkError, WorkflowError};
pub use history::HistoryEvent;
pub use registry::Registry;
pub use types::{
    ActivityOptions, EventAck, HistoryLimits, Payload, RetryConfig, RunId, RunOutcome, RunStatus,
    TaskQueue, WorkerRegistration, WorkflowId, WorkflowTask,
};
pub use worker::Worker;
pub use workflow::{RunCancellation, Workflow, WorkflowContext, WorkflowExit};

// Re-export async_trait so implementors need not depend on it directly.
pub use async_trait::async_trait;
