// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pulse region worker.
//!
//! Samples the `REGION` setting in a durable loop that truncates its own
//! history with continue-as-new.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  QUIC + mTLS   ┌─────────────────────────────────────┐
//! │ Orchestrator │◄──────────────►│ Worker (pulse-sdk)                  │
//! └──────────────┘                │   RegionWorkflow ──► GetRegion      │
//!                                 │   (controller)       (sampler)      │
//!                                 └─────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`config`]: environment configuration and loop variants
//! - [`sampler`]: the `GetRegion` activity
//! - [`controller`]: the `RegionWorkflow` loop
//! - [`bootstrap`]: connection setup and serving

pub mod bootstrap;
pub mod config;
pub mod controller;
pub mod error;
pub mod sampler;

pub use config::{ConnectionConfig, LoopConfig, LoopVariant, RestartPolicy, WorkerConfig};
pub use controller::{LoopState, LoopSummary, REGION_WORKFLOW, RegionLoop, RegionWorkflow};
pub use error::{ConfigError, SamplerError, StartupError};
pub use sampler::{
    MissingSetting, ProcessEnv, REGION_ACTIVITY, RegionSampler, SettingSource, StaticSettings,
};
