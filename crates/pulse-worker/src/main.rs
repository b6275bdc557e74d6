// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pulse worker - durable region sampler.
//!
//! Connects to the orchestrator named by `NAMESPACE`, registers the
//! `RegionWorkflow` / `GetRegion` pair on the task queue and serves until
//! SIGINT or SIGTERM. Startup failures are logged and the process exits
//! without serving.

use anyhow::Result;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use pulse_worker::bootstrap;
use pulse_worker::{ConnectionConfig, ProcessEnv, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    let dotenv = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pulse_worker=info,pulse_sdk=info")),
        )
        .init();

    if let Err(e) = dotenv {
        debug!(error = %e, "No .env file loaded");
    }
    info!(version = env!("CARGO_PKG_VERSION"), "Starting pulse worker");

    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Configuration error");
            return Ok(());
        }
    };
    info!(
        task_queue = %config.task_queue,
        variant = ?config.variant,
        policy = ?config.loop_config.restart_policy,
        timeout_ms = config.loop_config.activity_timeout.as_millis() as u64,
        embedded = config.embedded,
        "Configuration loaded"
    );

    let result = if config.embedded {
        bootstrap::run_embedded(config, ProcessEnv, shutdown_signal()).await
    } else {
        let connection = match ConnectionConfig::from_env() {
            Ok(connection) => connection,
            Err(e) => {
                error!(error = %e, "Configuration error");
                return Ok(());
            }
        };
        info!(
            namespace = %connection.namespace,
            target = %connection.target(),
            "Connecting to orchestrator"
        );
        bootstrap::run(&connection, config, ProcessEnv, shutdown_signal()).await
    };

    match result {
        Ok(()) => info!("Shutdown complete"),
        Err(e) => error!(error = %e, "Worker failed to start"),
    }
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Cannot listen for SIGTERM"),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT"),
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGINT, serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
