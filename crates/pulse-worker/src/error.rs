// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the region worker.

use pulse_protocol::TlsError;
use pulse_sdk::SdkError;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Failures of the region sampler.
#[derive(Debug, Error)]
pub enum SamplerError {
    /// The sampled setting is not set and the sampler is configured to fail.
    #[error("configuration unavailable: {0} is not set")]
    ConfigurationUnavailable(String),
}

/// Fatal errors before the worker starts serving. Never retried.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("certificate material unusable: {0}")]
    Tls(#[from] TlsError),

    #[error("orchestrator unavailable: {0}")]
    Orchestrator(#[from] SdkError),
}
